//! Seed the catalog with demo data.
//!
//! Creates a handful of categories and products with variants and stock.
//! Running it again skips products whose slug already exists.

use vendora_core::{CurrencyCode, Price};
use vendora_storefront::db::{CatalogRepository, RepositoryError};

const CATEGORIES: [(&str, &str); 4] = [
    ("electronics", "Electronics"),
    ("clothing", "Clothing"),
    ("books", "Books"),
    ("home-garden", "Home & Garden"),
];

struct SeedVariant {
    sku: &'static str,
    title: &'static str,
    price_cents: i64,
    stock: i64,
}

struct SeedProduct {
    slug: &'static str,
    title: &'static str,
    description: &'static str,
    thumbnail: &'static str,
    variants: &'static [SeedVariant],
}

const PRODUCTS: &[SeedProduct] = &[
    SeedProduct {
        slug: "wireless-headphones",
        title: "Premium Wireless Headphones",
        description: "High-quality wireless headphones with noise cancellation and 30-hour battery life.",
        thumbnail: "https://images.unsplash.com/photo-1505740420928-5e560c06d30e?w=800",
        variants: &[
            SeedVariant { sku: "WH-BLK-001", title: "Black", price_cents: 29_999, stock: 50 },
            SeedVariant { sku: "WH-WHT-001", title: "White", price_cents: 29_999, stock: 30 },
        ],
    },
    SeedProduct {
        slug: "smart-watch",
        title: "Fitness Smart Watch",
        description: "Track your health and fitness with heart rate monitoring and GPS.",
        thumbnail: "https://images.unsplash.com/photo-1523275335684-37898b6baf30?w=800",
        variants: &[
            SeedVariant { sku: "SW-BLK-001", title: "Black Band", price_cents: 19_999, stock: 75 },
            SeedVariant { sku: "SW-BLU-001", title: "Blue Band", price_cents: 19_999, stock: 60 },
        ],
    },
    SeedProduct {
        slug: "wireless-keyboard",
        title: "Mechanical Wireless Keyboard",
        description: "Mechanical keyboard with customizable RGB lighting and wireless connectivity.",
        thumbnail: "https://images.unsplash.com/photo-1587829741301-dc798b83add3?w=800",
        variants: &[SeedVariant { sku: "KB-BLK-001", title: "Black", price_cents: 12_999, stock: 40 }],
    },
    SeedProduct {
        slug: "usb-c-cable",
        title: "USB-C Fast Charging Cable",
        description: "Durable braided USB-C cable with fast charging support up to 100W.",
        thumbnail: "https://images.unsplash.com/photo-1591290619762-d77cf6f24d78?w=800",
        variants: &[
            SeedVariant { sku: "CBL-1M-001", title: "1 Meter", price_cents: 1_499, stock: 200 },
            SeedVariant { sku: "CBL-2M-001", title: "2 Meters", price_cents: 1_999, stock: 150 },
        ],
    },
    SeedProduct {
        slug: "laptop-stand",
        title: "Aluminum Laptop Stand",
        description: "Ergonomic laptop stand made from aluminum with adjustable height.",
        thumbnail: "https://images.unsplash.com/photo-1527864550417-7fd91fc51a46?w=800",
        variants: &[SeedVariant { sku: "LS-SLV-001", title: "Silver", price_cents: 4_999, stock: 85 }],
    },
];

/// Counts reported after seeding.
#[derive(Debug, Default)]
pub struct SeedResult {
    pub categories: usize,
    pub products_inserted: usize,
    pub products_skipped: usize,
    pub variants_inserted: usize,
}

/// Seed categories and demo products.
///
/// # Errors
///
/// Returns an error if the database can't be opened or a write fails for
/// a reason other than the row already existing.
pub async fn run() -> Result<SeedResult, Box<dyn std::error::Error>> {
    let pool = super::connect().await?;
    let catalog = CatalogRepository::new(&pool);
    let mut result = SeedResult::default();

    let mut electronics = None;
    for (slug, name) in CATEGORIES {
        let category = catalog.upsert_category(slug, name).await?;
        if slug == "electronics" {
            electronics = Some(category.id);
        }
        result.categories += 1;
    }

    for product in PRODUCTS {
        if catalog.get_by_slug(product.slug).await?.is_some() {
            result.products_skipped += 1;
            continue;
        }
        let product_id = match catalog
            .insert_product(
                product.slug,
                product.title,
                Some(product.description),
                Some(product.thumbnail),
                electronics,
            )
            .await
        {
            Ok(id) => id,
            Err(RepositoryError::Conflict(_)) => {
                result.products_skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        result.products_inserted += 1;

        for variant in product.variants {
            let price = Price::from_cents(variant.price_cents, CurrencyCode::Usd);
            match catalog
                .add_variant(product_id, variant.sku, variant.title, price, variant.stock, None)
                .await
            {
                Ok(_) => result.variants_inserted += 1,
                Err(RepositoryError::Conflict(_)) => {
                    tracing::warn!(sku = variant.sku, "SKU already exists, skipping variant");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    tracing::info!("Seeding complete!");
    tracing::info!("  Categories: {}", result.categories);
    tracing::info!("  Products inserted: {}", result.products_inserted);
    tracing::info!("  Products skipped (already exist): {}", result.products_skipped);
    tracing::info!("  Variants inserted: {}", result.variants_inserted);

    Ok(result)
}
