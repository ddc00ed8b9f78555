use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use lead_relay::channels::sms::whatsapp_address;
use lead_relay::channels::{Channel, EmailSender, SmsSender, SmtpMailer, TwilioClient};
use lead_relay::config::{AppConfig, EmailProviderConfig};
use lead_relay::server;

/// Contact-form lead relay: HTTP server plus provider diagnostics.
#[derive(Debug, Parser)]
#[command(name = "lead-relay", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Verify SMTP settings; sends a test mail when EMAIL_TO is set.
    SmtpCheck,
    /// Show the delivery status of a Twilio message.
    SmsStatus {
        /// Message SID (SM...).
        sid: String,
    },
    /// List phone numbers owned by the Twilio account.
    TwilioNumbers,
    /// Send a test WhatsApp message to WHATSAPP_TO (or CONTACT_PHONE).
    WhatsappTest,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional .env; real environment variables take precedence.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("invalid configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            eprintln!("📨 lead-relay v{}", env!("CARGO_PKG_VERSION"));
            eprintln!("   API: http://0.0.0.0:{}/api/lead", config.port);
            eprintln!("   Database: {}", config.db_path.display());
            server::serve(config).await?;
        }
        Command::SmtpCheck => smtp_check(&config).await?,
        Command::SmsStatus { sid } => sms_status(&config, &sid).await?,
        Command::TwilioNumbers => twilio_numbers(&config).await?,
        Command::WhatsappTest => whatsapp_test(&config).await?,
    }

    Ok(())
}

async fn smtp_check(config: &AppConfig) -> anyhow::Result<()> {
    let EmailProviderConfig::Smtp(smtp) = &config.email else {
        bail!("EMAIL_PROVIDER is not smtp; nothing to check");
    };

    println!(
        "Testing SMTP connection to {} port {}",
        smtp.host.as_deref().unwrap_or("<unset>"),
        smtp.port
    );
    let mailer = SmtpMailer::new(smtp.clone());
    mailer.verify().await.context("SMTP check failed")?;
    println!("Transport verified OK.");

    match config.targets.email_to.as_deref() {
        Some(to) => {
            let text = "This is a connectivity test from the lead-relay backend";
            let receipt = mailer
                .send(
                    to,
                    "SMTP connectivity test",
                    text,
                    &format!("<p>{text}</p>"),
                )
                .await
                .context("SMTP send failed")?;
            println!(
                "Send ok: {}",
                receipt.provider_id.as_deref().unwrap_or("<no message id>")
            );
        }
        None => println!("EMAIL_TO not set, skipping send."),
    }
    Ok(())
}

async fn sms_status(config: &AppConfig, sid: &str) -> anyhow::Result<()> {
    let client = TwilioClient::new(config.twilio.clone());
    let message = client
        .fetch_message(sid)
        .await
        .context("message fetch failed")?;

    println!("sid:          {}", message.sid);
    println!("status:       {}", message.status);
    println!(
        "error code:   {}",
        message
            .error_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".into())
    );
    println!(
        "error:        {}",
        message.error_message.as_deref().unwrap_or("-")
    );
    println!("from:         {}", message.from.as_deref().unwrap_or("-"));
    println!("to:           {}", message.to.as_deref().unwrap_or("-"));
    println!(
        "created:      {}",
        message.date_created.as_deref().unwrap_or("-")
    );
    Ok(())
}

async fn twilio_numbers(config: &AppConfig) -> anyhow::Result<()> {
    let client = TwilioClient::new(config.twilio.clone());
    let numbers = client
        .list_incoming_numbers()
        .await
        .context("failed to list numbers")?;

    println!("Owned Twilio numbers:");
    for number in numbers {
        println!("{number}");
    }
    Ok(())
}

async fn whatsapp_test(config: &AppConfig) -> anyhow::Result<()> {
    let Some(raw_to) = config
        .targets
        .whatsapp_to
        .as_deref()
        .or(config.targets.sms_to.as_deref())
    else {
        bail!("set WHATSAPP_TO or CONTACT_PHONE");
    };

    let to = whatsapp_address(raw_to);
    let from = whatsapp_address(&config.twilio.whatsapp_from);
    println!("Sending from {from} to {to}");

    let client = TwilioClient::new(config.twilio.clone());
    let receipt = client
        .send(
            Channel::WhatsApp,
            &to,
            Some(&from),
            "Test WhatsApp message from lead-relay (sandbox).",
        )
        .await
        .context("send failed")?;
    println!(
        "Message created: sid={} status={}",
        receipt.provider_id, receipt.status
    );
    Ok(())
}
