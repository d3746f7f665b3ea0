use std::path::PathBuf;

use clap::Parser;
use federated_login::{
    LoginConfig, LoginSession, auth::SessionTokens, observability::init_tracing,
    validation::require_https,
};
use tokio_util::sync::CancellationToken;

/// CLI arguments for the federated login client
#[derive(Parser, Debug)]
#[command(version, about = "Browser-less SAML federated login", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "federated-login.toml")]
    config: PathBuf,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run a federated login and print the resulting session (default)
    Login {
        /// Override the IdP base URL from the config file
        #[arg(long)]
        authenticator: Option<String>,
    },
    /// Validate the config file and exit
    Check,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match LoginConfig::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "Failed to load config from {}: {}",
                args.config.display(),
                e
            );
            std::process::exit(1);
        }
    };

    match args.command.unwrap_or(Command::Login {
        authenticator: None,
    }) {
        Command::Check => {
            println!("Configuration OK: {:?}", config.connection);
        }
        Command::Login { authenticator } => run_login(config, authenticator).await,
    }
}

async fn run_login(mut config: LoginConfig, authenticator: Option<String>) {
    if let Err(e) = init_tracing(&config.observability) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if let Some(authenticator) = authenticator {
        config.connection.authenticator = authenticator;
    }

    let idp_base_url = match require_https(&config.connection.authenticator) {
        Ok(url) => url,
        Err(e) => {
            eprintln!("Invalid authenticator URL: {}", e);
            std::process::exit(1);
        }
    };

    let mut session = match LoginSession::from_config(config.connection) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, cancelling login");
                cancel.cancel();
            }
        });
    }

    match session.authenticate_federated(idp_base_url, &cancel).await {
        Ok(tokens) => print_session(tokens),
        Err(e) => {
            eprintln!("Federated login failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print session details. Token values are never printed.
fn print_session(tokens: &SessionTokens) {
    println!("Login succeeded");
    if let Some(session_id) = &tokens.session_id {
        println!("  session id:  {}", session_id);
    }
    if let Some(validity) = tokens.validity {
        println!("  valid for:   {}s", validity.as_secs());
    }
    let info = &tokens.session_info;
    for (label, value) in [
        ("database", &info.database_name),
        ("schema", &info.schema_name),
        ("warehouse", &info.warehouse_name),
        ("role", &info.role_name),
    ] {
        if let Some(value) = value {
            println!("  {:<12} {}", format!("{label}:"), value);
        }
    }
}
