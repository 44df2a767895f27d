use anyhow::Result;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::env;

use crate::error::AppError;
use crate::services::scheduler::ReminderDispatcher;

pub struct EmailService {
    mailer: SmtpTransport,
    from_address: String,
}

impl EmailService {
    pub fn new() -> Result<Self> {
        let smtp_host = env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string());
        let smtp_port = env::var("SMTP_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse::<u16>()
            .unwrap_or(587);
        let smtp_username = env::var("SMTP_USERNAME").unwrap_or_default();
        let smtp_password = env::var("SMTP_PASSWORD").unwrap_or_default();
        let from_address = env::var("SMTP_FROM_ADDRESS")
            .unwrap_or_else(|_| "noreply@studyplanner.local".to_string());

        let mailer = if smtp_username.is_empty() {
            SmtpTransport::builder_dangerous(&smtp_host)
                .port(smtp_port)
                .build()
        } else {
            let creds = Credentials::new(smtp_username, smtp_password);
            SmtpTransport::relay(&smtp_host)?
                .port(smtp_port)
                .credentials(creds)
                .build()
        };

        Ok(Self {
            mailer,
            from_address,
        })
    }

    pub fn send_reminder_email(
        &self,
        to_email: &str,
        schedule_title: &str,
        minutes_before: i64,
        start_time_formatted: &str,
        duration_minutes: i64,
    ) -> Result<()> {
        if env::var("SMTP_SKIP_SEND").unwrap_or_default() == "true" {
            return Ok(());
        }
        let body = format!(
            r#"
Your study session "{}" starts in {} minutes.

Starts at: {}
Planned length: {} minutes

Have your materials ready. Good luck!

---
StudyPlanner
"#,
            schedule_title, minutes_before, start_time_formatted, duration_minutes
        );

        let email = Message::builder()
            .from(self.from_address.parse()?)
            .to(to_email.parse()?)
            .subject(format!(
                "Reminder: {} starts in {} minutes",
                schedule_title, minutes_before
            ))
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;

        self.mailer.send(&email)?;
        Ok(())
    }
}

impl ReminderDispatcher for EmailService {
    fn send_reminder(
        &self,
        recipient: &str,
        schedule_title: &str,
        minutes_before: i64,
        start_time_formatted: &str,
        duration_minutes: i64,
    ) -> Result<(), AppError> {
        self.send_reminder_email(
            recipient,
            schedule_title,
            minutes_before,
            start_time_formatted,
            duration_minutes,
        )
        .map_err(|err| AppError::Dispatch(err.to_string()))
    }
}
