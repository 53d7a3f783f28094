//! Certificate manager CLI for Synology DSM.
//!
//! Usage:
//!   dsm-certctl -c /etc/dsm-certctl.conf list
//!   dsm-certctl upload --key server.key --cert server.crt --ca chain.pem
//!   dsm-certctl bind 0rNJhn --service "DSM Desktop Service"
//!   dsm-certctl --stderr export 0rNJhn -o nas.zip   # log to stderr

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{error, info};

use dsm_certctl::binding::{current_bindings, BindOutcome, ServiceBinder, DEFAULT_SERVICE};
use dsm_certctl::config::{self, ClientConfig};
use dsm_certctl::registry::CertificateRegistry;
use dsm_certctl::transfer::{CertificateTransfer, ExportOutcome, UploadRequest};
use dsm_certctl::HttpSession;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "dsm-certctl", about = "Manage X.509 certificates on a Synology DSM appliance")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", default_value = "/etc/dsm-certctl.conf")]
    config: PathBuf,

    /// Log to stderr even when the config asks for syslog.
    #[arg(long)]
    stderr: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List installed certificates.
    List,
    /// Show which certificate serves each service.
    Bindings,
    /// Mark a certificate as the default.
    SetDefault { id: String },
    /// Delete one or more certificates.
    #[command(alias = "rm")]
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Upload a key, certificate and optional chain.
    Upload {
        #[arg(long)]
        key:  PathBuf,
        #[arg(long)]
        cert: PathBuf,
        /// Intermediate / CA chain.
        #[arg(long)]
        ca:   Option<PathBuf>,
        /// Replace this existing certificate instead of creating one.
        #[arg(long)]
        id:   Option<String>,
        #[arg(long)]
        desc: Option<String>,
        /// Do not make the uploaded certificate the default.
        #[arg(long)]
        no_default: bool,
    },
    /// Download a certificate archive.
    Export {
        id: String,
        /// Output file (default `<id>-<timestamp>.zip`).
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
    /// Make a certificate serve a DSM service.
    Bind {
        id: String,
        #[arg(long, default_value = DEFAULT_SERVICE)]
        service: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match config::load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("dsm-certctl: config error: {e}");
            process::exit(1);
        }
    };
    if let Err(e) = config::validate_config(&cfg) {
        eprintln!("dsm-certctl: config validation: {e}");
        process::exit(1);
    }

    let use_syslog = cfg.log_syslog && !cli.stderr;
    if let Err(e) = setup_logging(use_syslog) {
        eprintln!("dsm-certctl: {e:#}");
        process::exit(1);
    }

    if let Err(e) = run(&cfg, cli.command).await {
        error!("{e:#}");
        process::exit(1);
    }
}

async fn run(cfg: &ClientConfig, command: Command) -> anyhow::Result<()> {
    let session = HttpSession::from_config(cfg).context("building DSM session")?;
    info!("DSM {} at {}", cfg.dsm_version, session.base_url());

    match command {
        Command::List => {
            let certs = CertificateRegistry::new(&session).list().await?;
            for c in &certs {
                let services: Vec<&str> =
                    c.services.iter().map(|s| s.display_name.as_str()).collect();
                println!(
                    "{}{:<8} {:<32} {:<28} {}",
                    if c.is_default { "*" } else { " " },
                    c.id,
                    c.common_name(),
                    c.valid_till.as_deref().unwrap_or("-"),
                    services.join(", "),
                );
            }
        }

        Command::Bindings => {
            let certs = CertificateRegistry::new(&session).list().await?;
            for (service, id) in current_bindings(&certs) {
                println!("{service:<40} {id}");
            }
        }

        Command::SetDefault { id } => {
            CertificateRegistry::new(&session).set_default(&id).await?;
            println!("{id} is now the default certificate");
        }

        Command::Delete { ids } => {
            CertificateRegistry::new(&session).delete(ids).await?;
        }

        Command::Upload { key, cert, ca, id, desc, no_default } => {
            let mut req = UploadRequest::new(key, cert).as_default(!no_default);
            if let Some(ca) = ca {
                req = req.ca(ca);
            }
            if let Some(id) = id {
                req = req.replace(id);
            }
            if let Some(desc) = desc {
                req = req.desc(desc);
            }
            let reply = CertificateTransfer::new(&session)
                .upload(&req)
                .await
                .context("certificate upload")?;
            if let Some(new_id) = reply.data().and_then(|d| d.get("id")).and_then(|v| v.as_str()) {
                println!("{new_id}");
            }
        }

        Command::Export { id, output } => {
            let outcome = CertificateTransfer::new(&session)
                .strict_export(cfg.strict_export)
                .export(&id)
                .await?;
            match outcome {
                ExportOutcome::Archive(archive) => {
                    let path = output.unwrap_or_else(|| {
                        let ts = chrono::Local::now().format("%Y%m%d%H%M%S");
                        PathBuf::from(format!("{id}-{ts}.zip"))
                    });
                    tokio::fs::write(&path, archive.into_inner())
                        .await
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("{}", path.display());
                }
                ExportOutcome::Missing { status } => {
                    anyhow::bail!("export of {id} failed (HTTP {status})");
                }
            }
        }

        Command::Bind { id, service } => {
            let outcome = ServiceBinder::new(&session)
                .duplicate_policy(cfg.duplicate_binding)
                .bind_certificate_to_service(&id, &service)
                .await?;
            match outcome {
                BindOutcome::AlreadyBound { .. } => println!("{id} already serves {service}"),
                BindOutcome::Updated { old_id, .. } if old_id.is_empty() => {
                    println!("{id} now serves {service}")
                }
                BindOutcome::Updated { old_id, .. } => {
                    println!("{id} now serves {service} (replacing {old_id})")
                }
            }
        }
    }
    Ok(())
}

// ── Logging setup ─────────────────────────────────────────────────────────────

fn setup_logging(use_syslog: bool) -> anyhow::Result<()> {
    if use_syslog {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_USER,
            hostname: None,
            process:  "dsm-certctl".into(),
            pid:      process::id(),
        };
        let logger = syslog::unix(formatter)
            .map_err(|e| anyhow::anyhow!("syslog connect failed: {e}"))?;
        log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
            .map(|()| log::set_max_level(log::LevelFilter::Info))
            .map_err(|e| anyhow::anyhow!("set_logger: {e}"))?;
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }
    Ok(())
}
