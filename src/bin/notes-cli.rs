use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "notes-cli")]
#[command(about = "Client for the notes-gate API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check instance health
    Health,
    /// Show which instance answered
    Whoami,
    /// Obtain a demo token
    Login,
    /// List notes
    List {
        #[arg(short, long, env = "NOTES_TOKEN")]
        token: String,
    },
    /// Create a note
    Create {
        #[arg(short, long, env = "NOTES_TOKEN")]
        token: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let res = match cli.command {
        Commands::Health => client.get(format!("{}/health", cli.url)).send().await?,
        Commands::Whoami => client.get(format!("{}/whoami", cli.url)).send().await?,
        Commands::Login => client.post(format!("{}/login", cli.url)).send().await?,
        Commands::List { token } => {
            client
                .get(format!("{}/notes", cli.url))
                .headers(bearer(&token)?)
                .send()
                .await?
        }
        Commands::Create { token, title, body } => {
            client
                .post(format!("{}/notes", cli.url))
                .headers(bearer(&token)?)
                .json(&json!({ "title": title, "body": body }))
                .send()
                .await?
        }
    };

    print_response(res).await
}

fn bearer(token: &str) -> Result<HeaderMap, Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
    Ok(headers)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if let Some(remaining) = res.headers().get("ratelimit-remaining") {
        eprintln!("Quota remaining: {}", remaining.to_str().unwrap_or("?"));
    }

    if !status.is_success() {
        eprintln!("Error: API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
