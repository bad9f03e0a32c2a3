//! Transactional email: verification, password reset and order confirmation.
//!
//! Uses SMTP via lettre with Askama HTML and plain text templates. Without
//! SMTP configuration the rendered text body is written to the log instead.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;
use crate::models::OrderWithItems;

const STORE_NAME: &str = "Vendora";

#[derive(Template)]
#[template(path = "email/verification.html")]
struct VerificationEmailHtml<'a> {
    store_name: &'a str,
    name: Option<&'a str>,
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/verification.txt")]
struct VerificationEmailText<'a> {
    store_name: &'a str,
    name: Option<&'a str>,
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/password_reset.html")]
struct PasswordResetEmailHtml<'a> {
    store_name: &'a str,
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/password_reset.txt")]
struct PasswordResetEmailText<'a> {
    store_name: &'a str,
    link: &'a str,
}

struct ConfirmationLine {
    title: String,
    quantity: i64,
    amount: String,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    order_id: i64,
    lines: &'a [ConfirmationLine],
    total: &'a str,
    orders_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    order_id: i64,
    lines: &'a [ConfirmationLine],
    total: &'a str,
    orders_url: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

struct Smtp {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    smtp: Option<std::sync::Arc<Smtp>>,
    base_url: String,
}

impl EmailService {
    /// Create the service. `None` selects the log-only fallback.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay can't be configured.
    pub fn new(config: Option<&EmailConfig>, base_url: &str) -> Result<Self, SmtpError> {
        let smtp = config
            .map(|config| {
                let credentials = Credentials::new(
                    config.smtp_username.clone(),
                    config.smtp_password.expose_secret().to_string(),
                );

                let builder = if config.smtp_port == 465 {
                    AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
                };
                let mailer = builder.port(config.smtp_port).credentials(credentials).build();

                Ok::<_, SmtpError>(std::sync::Arc::new(Smtp {
                    mailer,
                    from_address: config.from_address.clone(),
                }))
            })
            .transpose()?;

        if smtp.is_none() {
            tracing::warn!("SMTP not configured, emails will be logged instead of sent");
        }

        Ok(Self {
            smtp,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    #[must_use]
    pub fn verification_link(&self, token: &str) -> String {
        format!(
            "{}/verify-email?token={}",
            self.base_url,
            urlencoding::encode(token)
        )
    }

    #[must_use]
    pub fn reset_link(&self, token: &str) -> String {
        format!(
            "{}/reset-password?token={}",
            self.base_url,
            urlencoding::encode(token)
        )
    }

    /// Send the account verification link.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_verification_email(
        &self,
        to: &str,
        name: Option<&str>,
        token: &str,
    ) -> Result<(), EmailError> {
        let link = self.verification_link(token);
        let html = VerificationEmailHtml {
            store_name: STORE_NAME,
            name,
            link: &link,
        }
        .render()?;
        let text = VerificationEmailText {
            store_name: STORE_NAME,
            name,
            link: &link,
        }
        .render()?;

        self.send_multipart_email(to, "Verify your email address", &text, &html)
            .await
    }

    /// Send a password reset link.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_password_reset_email(&self, to: &str, token: &str) -> Result<(), EmailError> {
        let link = self.reset_link(token);
        let html = PasswordResetEmailHtml {
            store_name: STORE_NAME,
            link: &link,
        }
        .render()?;
        let text = PasswordResetEmailText {
            store_name: STORE_NAME,
            link: &link,
        }
        .render()?;

        self.send_multipart_email(to, "Reset your password", &text, &html)
            .await
    }

    /// Send the receipt for a paid order.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_order_confirmation(&self, order: &OrderWithItems) -> Result<(), EmailError> {
        let (html, text) = self.render_order_confirmation(order)?;
        let subject = format!("Order #{} confirmed", order.order.id);
        self.send_multipart_email(order.order.email.as_str(), &subject, &text, &html)
            .await
    }

    fn render_order_confirmation(
        &self,
        order: &OrderWithItems,
    ) -> Result<(String, String), EmailError> {
        let lines: Vec<ConfirmationLine> = order
            .items
            .iter()
            .map(|item| ConfirmationLine {
                title: item
                    .title
                    .clone()
                    .or_else(|| item.sku.clone())
                    .unwrap_or_else(|| format!("Item {}", item.variant_id)),
                quantity: item.quantity,
                amount: item.line_total().to_string(),
            })
            .collect();
        let total = order.order.total.to_string();
        let orders_url = format!("{}/orders", self.base_url);
        let order_id = order.order.id.as_i64();

        let html = OrderConfirmationHtml {
            order_id,
            lines: &lines,
            total: &total,
            orders_url: &orders_url,
        }
        .render()?;
        let text = OrderConfirmationText {
            order_id,
            lines: &lines,
            total: &total,
            orders_url: &orders_url,
        }
        .render()?;
        Ok((html, text))
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let Some(smtp) = &self.smtp else {
            tracing::info!(to = %to, subject = %subject, body = %text_body, "Email not sent (SMTP not configured)");
            return Ok(());
        };

        let email = Message::builder()
            .from(
                smtp.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(smtp.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        smtp.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use vendora_core::{
        CurrencyCode, Email, OrderId, OrderItemId, OrderStatus, PaymentStatus, Price, VariantId,
    };

    use super::*;
    use crate::models::{Order, OrderItem};

    fn service() -> EmailService {
        EmailService::new(None, "https://shop.test/").unwrap()
    }

    #[test]
    fn test_links_are_encoded() {
        let svc = service();
        assert_eq!(
            svc.verification_link("ab cd"),
            "https://shop.test/verify-email?token=ab%20cd"
        );
        assert_eq!(
            svc.reset_link("xyz"),
            "https://shop.test/reset-password?token=xyz"
        );
    }

    #[test]
    fn test_verification_templates_escape_html() {
        let html = VerificationEmailHtml {
            store_name: STORE_NAME,
            name: Some("<b>Ann</b>"),
            link: "https://shop.test/verify-email?token=t",
        }
        .render()
        .unwrap();
        assert!(!html.contains("<b>Ann"));
        assert!(html.contains("Ann"));

        let text = VerificationEmailText {
            store_name: STORE_NAME,
            name: None,
            link: "https://shop.test/verify-email?token=t",
        }
        .render()
        .unwrap();
        assert!(text.starts_with("Welcome to Vendora\n"));
        assert!(text.contains("https://shop.test/verify-email?token=t"));
    }

    #[test]
    fn test_order_confirmation_lists_lines() {
        let now = Utc::now();
        let usd = |cents| Price::from_cents(cents, CurrencyCode::Usd);
        let order = OrderWithItems {
            order: Order {
                id: OrderId::new(7),
                user_id: None,
                email: Email::parse("buyer@shop.test").unwrap(),
                status: OrderStatus::Completed,
                payment_status: PaymentStatus::Succeeded,
                total: usd(4500),
                payment_intent_id: None,
                tracking_number: None,
                refund_id: None,
                refund_amount_cents: None,
                refund_reason: None,
                refunded_at: None,
                created_at: now,
                updated_at: now,
            },
            items: vec![OrderItem {
                id: OrderItemId::new(1),
                variant_id: VariantId::new(3),
                sku: Some("MUG-1".to_owned()),
                title: Some("Mug".to_owned()),
                quantity: 3,
                unit_price: usd(1500),
            }],
        };

        let (html, text) = service().render_order_confirmation(&order).unwrap();
        assert!(html.contains("#7"));
        assert!(text.contains("- Mug x 3: $45.00"));
        assert!(text.contains("Total: $45.00"));
        assert!(text.contains("https://shop.test/orders"));
    }

    #[tokio::test]
    async fn test_unconfigured_send_is_logged() {
        assert!(
            service()
                .send_password_reset_email("someone@shop.test", "tok")
                .await
                .is_ok()
        );
    }
}
