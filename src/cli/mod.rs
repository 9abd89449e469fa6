//! Command-line front end: send a template-driven or plain request and
//! print the response.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use clap::Parser;
use tracing::info;

use crate::client::Client;
use crate::config::ClientConfig;
use crate::hooks::{AuthHook, LoggingHook};
use crate::http::{HttpMethod, HttpResponse};

#[derive(Debug, Parser)]
#[command(name = "renderapi")]
#[command(about = "Send template-driven HTTP requests", long_about = None)]
pub struct Args {
    /// Base URL of the API
    #[arg(long)]
    pub url: Option<String>,

    /// Request template file
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// JSON data file rendered into the template
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Client configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Bearer token
    #[arg(long)]
    pub token: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// JavaScript before-request hook file
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// HTTP method when no template is given
    #[arg(long, default_value = "GET")]
    pub method: HttpMethod,

    /// Request path when no template is given
    #[arg(long)]
    pub path: Option<String>,

    /// Write the response body to this file
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Inline JSON: template data, or the body of a plain request
    #[arg(long)]
    pub raw: Option<String>,
}

impl Args {
    fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)?,
            None => {
                let Some(url) = &self.url else {
                    bail!("either --url or --config is required");
                };
                ClientConfig {
                    base_url: url.clone(),
                    timeout: self.timeout,
                    enable_logging: self.verbose,
                    ..Default::default()
                }
            }
        };
        if let Some(url) = &self.url {
            config.base_url = url.clone();
        }
        Ok(config)
    }
}

pub async fn run(args: Args) -> Result<()> {
    let config = args.client_config()?;

    let mut client = Client::new(config.base_url.clone(), config.timeout_duration())?;
    for (name, value) in &config.default_headers {
        client.set_header(name.clone(), value.clone());
    }
    if let Some(token) = args
        .token
        .clone()
        .or_else(|| config.auth_token.clone())
        .filter(|t| !t.is_empty())
    {
        client.add_before_hook(AuthHook::new(token));
    }
    if let Some(script) = &args.script {
        client.add_script_hook_from_file(script, false, Duration::ZERO)?;
    }
    if args.verbose || config.enable_logging {
        client.add_before_hook(LoggingHook);
        client.add_after_hook(LoggingHook);
    }

    let response = send(&client, &args).await?;
    info!(status = response.status.as_u16(), "request finished");
    println!("Status: {}", response.status);

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, &response.body)
                .await
                .with_context(|| format!("failed to write response to {}", path.display()))?;
            println!("Response saved to {}", path.display());
        }
        None => println!("{}", response.json().unwrap_or_else(|_| response.text())),
    }
    Ok(())
}

async fn send(client: &Client, args: &Args) -> Result<HttpResponse> {
    if let Some(template) = &args.template {
        let response = match (&args.data, &args.raw) {
            (Some(data), _) => client.execute_template_with_data_file(template, data).await?,
            (None, Some(raw)) => {
                let data: serde_json::Value =
                    serde_json::from_str(raw).context("--raw is not valid JSON")?;
                client.execute_template_file(template, &data).await?
            }
            (None, None) => bail!("a template needs --data or --raw"),
        };
        return Ok(response);
    }

    let Some(path) = &args.path else {
        bail!("either --template or --path is required");
    };
    let body = args.raw.clone().map(Bytes::from);
    Ok(client.request(args.method, path, body).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_template_invocation() {
        let args = Args::try_parse_from([
            "renderapi",
            "--url",
            "http://localhost:9000",
            "--template",
            "t.json",
            "--raw",
            "{}",
            "--method",
            "post",
        ])
        .unwrap();
        assert_eq!(args.method, HttpMethod::Post);
        assert_eq!(args.timeout, 30);
        let config = args.client_config().unwrap();
        assert_eq!(config.base_url, "http://localhost:9000");
        assert!(!config.enable_logging);
    }

    #[test]
    fn url_or_config_is_required() {
        let args = Args::try_parse_from(["renderapi", "--path", "/ping"]).unwrap();
        assert!(args.client_config().is_err());
    }
}
