use clap::{Parser, Subcommand, ValueEnum};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Admin CLI for the request guard", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, env = "GUARD_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show service status and log occupancy
    Status,
    /// Show aggregate request metrics
    Metrics,
    /// List recent log entries, newest first
    Logs {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// Only entries for this exact path
        #[arg(short, long)]
        path: Option<String>,
        /// Only entries with status >= 400
        #[arg(long, conflicts_with = "security")]
        errors: bool,
        /// Only entries carrying a security flag
        #[arg(long)]
        security: bool,
    },
    /// Dump the whole log to stdout
    Export {
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// Drop every log entry
    Clear,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    match cli.command {
        Commands::Status => {
            let res = client
                .get(format!("{base}/admin/status"))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Metrics => {
            let res = client
                .get(format!("{base}/admin/metrics"))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Logs {
            limit,
            path,
            errors,
            security,
        } => {
            let mut query = vec![("limit", limit.to_string())];
            if let Some(path) = path {
                query.push(("path", path));
            }
            if errors {
                query.push(("filter", "errors".to_string()));
            } else if security {
                query.push(("filter", "security".to_string()));
            }
            let res = client
                .get(format!("{base}/admin/logs"))
                .query(&query)
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Export { format } => {
            let format = match format {
                Format::Json => "json",
                Format::Csv => "csv",
            };
            let res = client
                .get(format!("{base}/admin/logs/export"))
                .query(&[("format", format)])
                .headers(headers)
                .send()
                .await?;
            let status = res.status();
            let body = res.text().await?;
            if status.is_success() {
                println!("{body}");
            } else {
                eprintln!("Error: Admin API returned status {status}");
                eprintln!("Response: {body}");
            }
        }
        Commands::Clear => {
            let res = client
                .delete(format!("{base}/admin/logs"))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
