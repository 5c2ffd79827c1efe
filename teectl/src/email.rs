//! Email notifications for booking outcomes.

use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::path::Path;

use crate::{
    config::{Config, EmailTransportConfig},
    errors::Error,
};

pub struct EmailService {
    transport: EmailTransport,
    from_email: String,
    from_name: String,
    receiver_email: String,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

impl EmailService {
    /// Returns `None` when notifications are disabled in config.
    pub fn new(config: &Config) -> Result<Option<Self>, Error> {
        let email_config = &config.email;
        if !email_config.enabled {
            return Ok(None);
        }

        let transport = match &email_config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Internal {
                    operation: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            EmailTransportConfig::File { path } => {
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        Ok(Some(Self {
            transport,
            from_email: email_config.from_email.clone(),
            from_name: email_config.from_name.clone(),
            receiver_email: email_config.receiver_email.clone(),
        }))
    }

    pub async fn send_booking_succeeded(
        &self,
        date: &str,
        requested_time: &str,
        booked_time: Option<&str>,
        gallery_url: &str,
    ) -> Result<(), Error> {
        let time_line = match booked_time {
            Some(actual) if actual != requested_time => {
                format!("Time: {actual} (requested {requested_time})")
            }
            _ => format!("Time: {requested_time}"),
        };

        let body = format!(
            r#"<!DOCTYPE html>
<html>
<body>
    <h3 style="color:#2a5e2a;">Reservation Successful!</h3>
    <p>Your tee time has been booked.</p>
    <p>Date: {date}<br>
       {time_line}</p>
    <h4>Reservation Confirmation:</h4>
    <p><a href="{gallery_url}">View attempt screenshots</a></p>
    <p>Thank you for using our service!</p>
</body>
</html>"#
        );

        self.send_email("Reservation Status Update", &body).await
    }

    pub async fn send_booking_failed(
        &self,
        date: &str,
        requested_time: &str,
        error: &str,
        gallery_url: &str,
    ) -> Result<(), Error> {
        let body = format!(
            r#"<!DOCTYPE html>
<html>
<body>
    <h3 style="color:#8b0000;">Reservation Failed</h3>
    <p>We were unable to book your tee time for {date} at {requested_time}.</p>
    <p>Reason: {error}</p>
    <h4>Error Screenshots:</h4>
    <p><a href="{gallery_url}">View attempt evidence</a></p>
    <p>Please try again later or contact support if the issue persists.</p>
    <p>We apologize for any inconvenience.</p>
</body>
</html>"#
        );

        self.send_email("Reservation Status Update", &body).await
    }

    async fn send_email(&self, subject: &str, body: &str) -> Result<(), Error> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse from email: {e}"),
            })?;

        let to = self
            .receiver_email
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse receiver email: {e}"),
            })?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| Error::Internal {
                operation: format!("build email message: {e}"),
            })?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send SMTP email: {e}"),
                })?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send file email: {e}"),
                })?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmailConfig;

    fn file_config(dir: &Path) -> Config {
        Config {
            email: EmailConfig {
                enabled: true,
                transport: EmailTransportConfig::File {
                    path: dir.to_string_lossy().into_owned(),
                },
                from_email: "bot@example.com".into(),
                from_name: "Tee Time Bot".into(),
                receiver_email: "golfer@example.com".into(),
            },
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn disabled_config_builds_no_service() {
        assert!(EmailService::new(&Config::default()).unwrap().is_none());
    }

    #[tokio::test]
    async fn success_email_lands_in_the_file_transport() {
        let dir = tempfile::tempdir().unwrap();
        let service = EmailService::new(&file_config(dir.path())).unwrap().unwrap();

        service
            .send_booking_succeeded(
                "2025-06-01",
                "10:00",
                Some("10:10"),
                "http://localhost:8080/gallery?date=2025-06-01&time=10:00",
            )
            .await
            .unwrap();

        let wrote_one_message = std::fs::read_dir(dir.path()).unwrap().count() == 1;
        assert!(wrote_one_message);
    }
}
