use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use platform_authn::{Role, Session, issue_token};
use platform_obs::{ObsConfig, init_tracing};
use server::{
    Modules,
    config::AppConfig,
    http::{self, AppState, ServeConfig},
    seed,
};
use tracing::info;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "erp-server", version, about = "ERP suite backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server.
    Serve(ServeCommand),
    /// Print a session token for local use.
    Token(TokenCommand),
    /// List the module routes.
    Modules,
}

#[derive(Args, Debug)]
struct ServeCommand {
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    #[arg(long, help = "Populate the demo company before serving")]
    seed_demo: bool,
}

#[derive(Args, Debug)]
struct TokenCommand {
    #[arg(long, help = "Company (tenant) id")]
    company: Uuid,
    #[arg(long, help = "User id; random when omitted")]
    user: Option<Uuid>,
    #[arg(long, default_value = "OWNER")]
    role: Role,
}

impl From<&ServeCommand> for ServeConfig {
    fn from(value: &ServeCommand) -> Self {
        ServeConfig::new(value.host, value.port)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(ObsConfig::from_env())?;
    let cli = Cli::parse();
    let app_config = AppConfig::load()?;
    match cli.command {
        Command::Serve(cmd) => run_server(cmd, app_config).await,
        Command::Token(cmd) => print_token(cmd, &app_config),
        Command::Modules => {
            for name in Modules::names() {
                println!("/api/{name}");
            }
            Ok(())
        }
    }
}

async fn run_server(cmd: ServeCommand, config: AppConfig) -> Result<()> {
    let modules = Modules::new();
    if cmd.seed_demo || config.seed_demo_data {
        seed::demo(&modules, config.demo_company_id)
            .await
            .context("failed to seed demo data")?;
        info!(
            company = %config.demo_company_id,
            "demo company ready; mint a token with `erp-server token --company {}`",
            config.demo_company_id
        );
    }
    let serve_config = ServeConfig::from(&cmd);
    http::serve(serve_config, AppState::new(config), modules).await
}

fn print_token(cmd: TokenCommand, config: &AppConfig) -> Result<()> {
    let session = Session {
        user_id: cmd.user.unwrap_or_else(Uuid::new_v4),
        company_id: cmd.company,
        roles: vec![cmd.role],
    };
    let token = issue_token(&session, &config.auth).context("failed to sign session token")?;
    println!("{token}");
    Ok(())
}
