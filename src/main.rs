use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use oauth2client::config::AppConfig;
use oauth2client::oauth::callback_server::CallbackServer;
use oauth2client::oauth::{
    AuthenticatedClient, AuthorizationFlow, Credential, CredentialStore, FlowEvent, FlowRunner,
    HttpTransport, RunError, TokenExchangeClient,
};

type BoxError = Box<dyn Error + Send + Sync>;
type Flow = AuthorizationFlow<TokenExchangeClient, Arc<dyn CredentialStore>>;

#[derive(Debug, Parser)]
#[command(name = "oauth2client", version, about = "OAuth2 authorization code flow client")]
struct Cli {
    /// Config file (default: {config_dir}/oauth2client/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for JSON log files
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Authorize this client and store the credential
    Login {
        /// Print the authorization URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// Show the stored credential (secrets redacted)
    Show,
    /// GET a protected resource with the stored credential
    Fetch {
        /// Resource URL (default: [resource] url from the config)
        url: Option<String>,
    },
    /// Remove the stored credential
    Logout,
}

/// Everything built once at startup and shared by the commands.
struct App {
    config: AppConfig,
    transport: HttpTransport,
    flow: Arc<Flow>,
}

impl App {
    fn build(config: AppConfig) -> Result<Self, BoxError> {
        let client = Arc::new(config.client_config()?);
        let transport = HttpTransport::new(config.http_timeout(), &config.http.user_agent)?;
        let store = config.storage.open()?;
        tracing::debug!(backend = store.name(), "Opened credential store");

        let exchange = TokenExchangeClient::new(client.clone(), transport.clone());
        let flow = AuthorizationFlow::new(client, exchange, store, config.flow.user_id.clone())
            .with_state_ttl(config.state_ttl());

        Ok(Self {
            config,
            transport,
            flow: Arc::new(flow),
        })
    }

    async fn login(&self, no_browser: bool) -> Result<(), BoxError> {
        if let Some(existing) = self.flow.stored_credential().await? {
            println!(
                "A credential for '{}' is already stored; it will be replaced.",
                existing.user_id
            );
        }

        let open_browser = self.config.flow.open_browser && !no_browser;
        let uri = match CallbackServer::for_redirect(&self.flow.config().redirect_uri) {
            Some(server) => {
                // Bind before the URL is shown so the redirect cannot race the listener.
                let handle = server.start().await?;
                self.present_url(open_browser);
                println!("Waiting for the browser to return to {} ...", handle.redirect_uri());
                handle.wait(self.config.callback_timeout()).await?
            }
            None => {
                self.present_url(open_browser);
                read_pasted_uri().await?
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = FlowRunner::new(
            self.flow.clone(),
            AuthenticatedClient::new(self.transport.clone()),
            self.config.resource.url.clone(),
            tx,
        );
        runner.spawn_callback(uri);
        drop(runner);

        let mut outcome = Ok(());
        while let Some(event) = rx.recv().await {
            match event {
                FlowEvent::Ignored => {
                    outcome = Err("that URL is not a redirect for this client".into());
                }
                FlowEvent::Authorized(credential) => {
                    println!("Signed in as '{}'.", credential.user_id);
                    print_credential(&credential);
                }
                FlowEvent::ResourceLoaded(body) => println!("{body}"),
                FlowEvent::Failed(err) => {
                    if let RunError::Request(ref e) = err {
                        println!("Credential stored, but the resource request failed.");
                        if e.requires_reauth() {
                            println!("The server no longer accepts this token; run `login` again.");
                        }
                    } else if err.is_retryable() {
                        println!("This looks transient; running `login` again may succeed.");
                    }
                    outcome = Err(err.into());
                }
            }
        }
        outcome
    }

    fn present_url(&self, open_browser: bool) {
        let url = self.flow.begin_authorization();
        println!("Authorize this client by visiting:\n\n  {url}\n");
        if open_browser {
            if let Err(e) = open::that(&url) {
                tracing::warn!(error = %e, "Could not open a browser");
                println!("(Could not open a browser automatically; open the URL above.)");
            }
        }
    }

    async fn show(&self) -> Result<(), BoxError> {
        match self.flow.stored_credential().await? {
            Some(credential) => print_credential(&credential),
            None => println!("No credential stored for '{}'.", self.flow.user_id()),
        }
        Ok(())
    }

    async fn fetch(&self, url: Option<String>) -> Result<(), BoxError> {
        let credential = self
            .flow
            .stored_credential()
            .await?
            .ok_or("not signed in; run `login` first")?;
        let url = url
            .or_else(|| self.config.resource.url.clone())
            .ok_or("no URL given and no [resource] url configured")?;

        let client = AuthenticatedClient::new(self.transport.clone());
        match client.get_json(&credential, &url).await {
            Ok(body) => {
                println!("{body}");
                Ok(())
            }
            Err(e) => {
                if e.requires_reauth() {
                    println!("The server no longer accepts this token; run `login` again.");
                }
                Err(e.into())
            }
        }
    }

    async fn logout(&self) -> Result<(), BoxError> {
        self.flow.sign_out().await?;
        println!("Removed credential for '{}'.", self.flow.user_id());
        Ok(())
    }
}

fn print_credential(credential: &Credential) {
    println!("  user:          {}", credential.user_id);
    println!("  token type:    {}", credential.token_type);
    println!("  access token:  [REDACTED]");
    println!(
        "  refresh token: {}",
        if credential.refresh_token.is_some() { "[REDACTED]" } else { "none" }
    );
    match credential.expires_at_datetime() {
        Some(at) if credential.is_expired() => println!("  expires:       {at} (expired)"),
        Some(at) => println!("  expires:       {at}"),
        None => println!("  expires:       unknown"),
    }
}

async fn read_pasted_uri() -> Result<String, BoxError> {
    println!("After approving, paste the full URL you were redirected to:");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    let line = line.trim();
    if line.is_empty() {
        return Err("no URL entered".into());
    }
    Ok(line.to_string())
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let app = App::build(config)?;

    match cli.command {
        Command::Login { no_browser } => app.login(no_browser).await,
        Command::Show => app.show().await,
        Command::Fetch { url } => app.fetch(url).await,
        Command::Logout => app.logout().await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let _log_guard = oauth2client::core::logging::init(cli.log_dir.as_deref());
    tracing::info!("{} v{} starting", oauth2client::NAME, oauth2client::VERSION);

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "Command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
