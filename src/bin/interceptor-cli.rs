use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "interceptor-cli")]
#[command(about = "Management CLI for the API interceptor", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:4040")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show backend status and public URL
    Status,
    /// Point the interceptor at a backend port
    Configure {
        /// Backend port
        #[arg(short, long)]
        port: u16,

        /// Tunnel mode: public, reserved or custom
        #[arg(short, long, default_value = "public")]
        mode: String,

        /// Reserved token (custom mode)
        #[arg(long)]
        token: Option<String>,

        /// Port the token was reserved for (custom mode)
        #[arg(long)]
        token_port: Option<u16>,
    },
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    // Redirects are reported, not followed; the target is an HTML page.
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}/status", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::Configure {
            port,
            mode,
            token,
            token_port,
        } => {
            let mut form = vec![
                ("port", port.to_string()),
                ("zrok_option", mode),
            ];
            if let Some(token) = token {
                form.push(("zrok_token", token));
            }
            if let Some(token_port) = token_port {
                form.push(("zrok_port", token_port.to_string()));
            }

            let res = client
                .post(format!("{}/configure", cli.url))
                .form(&form)
                .send()
                .await?;

            if !res.status().is_redirection() {
                return Err(failure("configure", res).await.into());
            }
            println!("Configured backend on port {}", port);
            let res = client.get(format!("{}/status", cli.url)).send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

/// Describe a non-successful response, including its body when readable.
async fn failure(what: &str, res: reqwest::Response) -> String {
    let status = res.status();
    match res.text().await {
        Ok(text) if !text.trim().is_empty() => {
            format!("{} returned status {}: {}", what, status, text.trim())
        }
        _ => format!("{} returned status {}", what, status),
    }
}

async fn print_response(res: reqwest::Response) -> CliResult<()> {
    if !res.status().is_success() {
        return Err(failure("interceptor", res).await.into());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
