//! hubctl - Company Hub command line client
//!
//! Logs in against the hub backend, keeps the session on disk, and calls the
//! API with the same auth and error handling as the web portal.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hub_client::api::{
    recover_from, CompanyRegistration, LoginOutcome, ManagerRegistration, Method,
};
use hub_client::{
    ApiClient, ClientConfig, Decision, FileSessionStore, NormalizedError, Role, RouteGuard,
    RouteRequirement, SessionStore,
};

#[derive(Parser)]
#[command(name = "hubctl")]
#[command(version, about = "Company Hub command line client", long_about = None)]
struct Cli {
    /// Backend API base URL (overrides HUB_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Session file (overrides HUB_SESSION_FILE)
    #[arg(long, global = true)]
    session_file: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn,hub_client=info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session
    Login {
        #[command(subcommand)]
        target: LoginTarget,
    },
    /// Register a company or manager account
    Register {
        #[command(subcommand)]
        target: RegisterTarget,
    },
    /// Clear the stored session
    Logout,
    /// Show the stored session
    Whoami {
        /// Emit only JSON
        #[arg(short, long)]
        json: bool,
    },
    /// Evaluate the route guard for a portal path
    /// Examples:
    ///     hubctl route /dashboard
    ///     hubctl route /employee/dashboard
    #[command(verbatim_doc_comment)]
    Route {
        /// Portal path, e.g. /tasks
        path: String,
    },
    /// List registered companies
    Companies {
        #[arg(short, long)]
        json: bool,
    },
    /// Create an employee invite link
    Invite {
        #[arg(short, long)]
        json: bool,
    },
    /// Upload a resume for analysis during onboarding
    Resume {
        /// Resume file (PDF or Word)
        #[arg(short, long)]
        file: PathBuf,

        /// Invite token from the onboarding link
        #[arg(short, long)]
        token: String,

        #[arg(short, long)]
        json: bool,
    },
    /// Call an arbitrary API endpoint with the stored credentials
    /// Examples:
    ///     hubctl api get /tasks/employees/<id>/tasks/
    ///     hubctl api post /company/employees/create/ --data '{"name":"Ada"}'
    #[command(verbatim_doc_comment)]
    Api {
        #[arg(value_enum)]
        method: HttpMethod,

        /// Endpoint path relative to the API base URL
        endpoint: String,

        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,

        #[arg(short, long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum LoginTarget {
    Company {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Manager {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Employee {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Face login with a captured JPEG frame
    Face {
        #[arg(short, long)]
        image: PathBuf,
    },
}

#[derive(Subcommand)]
enum RegisterTarget {
    Company {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        industry: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        website: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Manager {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        company_id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

struct App {
    client: ApiClient<FileSessionStore>,
    guard: RouteGuard<FileSessionStore>,
    config: ClientConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = ClientConfig::from_env().context("Failed to load configuration")?;
    if let Some(url) = cli.api_url {
        config = config.with_api_url(url);
        config.validate()?;
    }
    if let Some(path) = cli.session_file {
        config.session_file = Some(path);
    }

    let store = Arc::new(match &config.session_file {
        Some(path) => FileSessionStore::new(path),
        None => FileSessionStore::in_home_dir().context("Failed to locate session file")?,
    });
    tracing::debug!(api_url = %config.base_url(), session = %store.path().display(), "Configuration loaded");

    let app = App {
        client: ApiClient::new(&config, Arc::clone(&store)),
        guard: RouteGuard::new(store),
        config,
    };

    run(&app, cli.command).await
}

async fn run(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Login { target } => {
            let outcome = match target {
                LoginTarget::Company { email, password } => {
                    app.client.login_company(&email, &password).await
                }
                LoginTarget::Manager { email, password } => {
                    app.client.login_manager(&email, &password).await
                }
                LoginTarget::Employee { email, password } => {
                    app.client.login_employee(&email, &password).await
                }
                LoginTarget::Face { image } => {
                    let bytes = fs::read(&image)
                        .with_context(|| format!("Failed to read image: {}", image.display()))?;
                    app.client.face_login(&bytes).await
                }
            }
            .map_err(|e| report(&e))?;
            establish(app, &outcome)
        }

        Commands::Register { target } => {
            let receipt = match target {
                RegisterTarget::Company {
                    name,
                    email,
                    password,
                    industry,
                    address,
                    phone,
                    website,
                    description,
                } => {
                    let registration = CompanyRegistration {
                        name,
                        email,
                        password,
                        industry,
                        address,
                        phone,
                        website,
                        description,
                    };
                    app.client.register_company(&registration).await
                }
                RegisterTarget::Manager {
                    first_name,
                    last_name,
                    email,
                    password,
                    company_id,
                } => {
                    let registration = ManagerRegistration {
                        first_name,
                        last_name,
                        email,
                        password,
                        company_id,
                    };
                    app.client.register_manager(&registration).await
                }
            }
            .map_err(|e| report(&e))?;

            println!("Registration successful");
            if let Some(id) = receipt.company_id {
                println!("  Company ID: {}", id);
            }
            if let Some(id) = receipt.manager_id {
                println!("  Manager ID: {}", id);
            }
            Ok(())
        }

        Commands::Logout => {
            app.client.logout().map_err(|e| report(&e))?;
            println!("Logged out");
            Ok(())
        }

        Commands::Whoami { json } => {
            let session = app.client.store().get()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&session)?);
            } else if !session.is_authenticated() {
                println!("Not logged in");
            } else {
                println!("Role: {}", session.role.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string()));
                println!("Name: {}", session.display_name.as_deref().unwrap_or("-"));
                if let Some(company) = &session.company_name {
                    println!("Company: {}", company);
                }
                for (label, value) in [
                    ("Company ID", &session.company_id),
                    ("Manager ID", &session.manager_id),
                    ("Employee ID", &session.employee_id),
                ] {
                    if let Some(value) = value {
                        println!("{}: {}", label, value);
                    }
                }
            }
            Ok(())
        }

        Commands::Route { path } => {
            match app.guard.navigate(&path) {
                Decision::Allow => println!("allow"),
                Decision::Redirect(view) => println!("redirect {}", view.path()),
            }
            Ok(())
        }

        Commands::Companies { json } => {
            let companies = app.client.list_companies().await.map_err(|e| report(&e))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&companies)?);
            } else {
                for company in companies {
                    println!("{:>6}  {}", company.id, company.name);
                }
            }
            Ok(())
        }

        Commands::Invite { json } => {
            let requirement = RouteRequirement::Requires(Role::Company);
            ensure_allowed(app, requirement)?;
            let invite = match app.client.create_invite().await {
                Ok(invite) => invite,
                Err(e) => return Err(recover(app, &e, requirement).await),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&invite)?);
            } else {
                println!("Invite link: {}", invite.url);
                println!("Token: {}", invite.invite_token);
            }
            Ok(())
        }

        Commands::Resume { file, token, json } => {
            let contents = fs::read(&file)
                .with_context(|| format!("Failed to read resume: {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "resume".to_string());
            let analysis = app
                .client
                .analyze_resume(&file_name, contents, &token)
                .await
                .map_err(|e| report(&e))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            } else if analysis.success {
                println!("{}", serde_json::to_string_pretty(&analysis.analysis)?);
            } else {
                println!("{}", analysis.message.as_deref().unwrap_or("Resume analysis failed"));
            }
            Ok(())
        }

        Commands::Api {
            method,
            endpoint,
            data,
            json,
        } => {
            let body = data
                .map(|d| serde_json::from_str(&d).context("Failed to parse --data as JSON"))
                .transpose()?;
            let requirement = current_requirement(app);
            let value = match app.client.send_raw(method.into(), &endpoint, body).await {
                Ok(value) => value,
                Err(e) => return Err(recover(app, &e, requirement).await),
            };
            if json {
                println!("{}", serde_json::to_string(&value)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            Ok(())
        }
    }
}

fn establish(app: &App, outcome: &LoginOutcome) -> Result<()> {
    app.client.establish(outcome).map_err(|e| report(&e))?;
    let session = &outcome.session;
    println!(
        "Logged in as {} ({})",
        session.display_name.as_deref().or(session.email.as_deref()).unwrap_or("-"),
        session.role.map(|r| r.to_string()).unwrap_or_default()
    );
    if let Some(greeting) = &outcome.greeting {
        println!("{}", greeting);
    }
    Ok(())
}

/// Guard check for commands that stand in for protected views.
fn ensure_allowed(app: &App, requirement: RouteRequirement) -> Result<()> {
    match app.guard.check(requirement) {
        Decision::Allow => Ok(()),
        Decision::Redirect(view) => anyhow::bail!("Not logged in. Log in first ({}).", view.path()),
    }
}

/// Requirement matching the stored role, used to pick a login view on expiry.
fn current_requirement(app: &App) -> RouteRequirement {
    match app.client.store().get() {
        Ok(session) => session
            .role
            .map(RouteRequirement::Requires)
            .unwrap_or(RouteRequirement::Requires(Role::Company)),
        Err(_) => RouteRequirement::Requires(Role::Company),
    }
}

/// Print field errors and turn a normalized error into the command's failure.
fn report(err: &NormalizedError) -> anyhow::Error {
    if let Some(fields) = &err.field_errors {
        for (field, message) in fields {
            eprintln!("  {}: {}", field, message);
        }
    }
    anyhow::anyhow!("{} ({})", err.message, err.kind)
}

async fn recover(app: &App, err: &NormalizedError, requirement: RouteRequirement) -> anyhow::Error {
    let failure = report(err);
    if let Some(view) = recover_from(
        err,
        app.client.store().as_ref(),
        requirement,
        app.config.redirect_delay(),
    )
    .await
    {
        eprintln!("Session cleared. Log in again: {}", view.path());
    }
    failure
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_login() {
        let cli = Cli::try_parse_from([
            "hubctl", "login", "manager", "--email", "lead@acme.io", "--password", "pw",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Login {
                target: LoginTarget::Manager { .. }
            }
        ));
    }

    #[test]
    fn test_cli_parses_api_call() {
        let cli = Cli::try_parse_from([
            "hubctl", "--api-url", "http://hub/api", "api", "post", "/tasks/", "--data", "{}",
        ])
        .unwrap();
        assert_eq!(cli.api_url.as_deref(), Some("http://hub/api"));
        match cli.command {
            Commands::Api { method, endpoint, data, .. } => {
                assert_eq!(Method::from(method), Method::POST);
                assert_eq!(endpoint, "/tasks/");
                assert_eq!(data.as_deref(), Some("{}"));
            }
            _ => panic!("expected api command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_method() {
        assert!(Cli::try_parse_from(["hubctl", "api", "trace", "/x/"]).is_err());
    }
}
