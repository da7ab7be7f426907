//! Command line client for hrpc endpoints.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::time::Duration;

use clap::{Parser, Subcommand};
use hrpc_client::{ClientBuilder, Outcome};
use hrpc_transport_http::{HttpOptions, HttpTransport};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// RPC client error
    #[error(transparent)]
    Client(#[from] hrpc_client::Error),

    /// Result could not be printed
    #[error("failed to render result: {0}")]
    Render(#[from] serde_json::Error),

    /// Ping got no answer
    #[error("{0} is not responding")]
    Unreachable(Url),
}

#[derive(Clone, Debug, Parser)]
#[command(version, about = "Evaluate calls on remote objects over HTTP", long_about = None)]
struct Args {
    /// Endpoint requests are POSTed to
    #[arg(long, env = "HRPC_ENDPOINT")]
    endpoint: Url,

    /// Seconds to wait for a response
    #[arg(long, default_value_t = 15, env = "HRPC_TIMEOUT")]
    timeout: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Check whether the endpoint answers
    Ping,

    /// Call a method on a remote object and print the result
    Call {
        /// Uri of the remote object
        uri: String,

        /// Method to call
        method: String,

        /// Positional arguments; anything that is not valid JSON is sent as a string
        args: Vec<String>,
    },
}

fn parse_argument(arg: &str) -> Value {
    serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.to_string()))
}

fn main() -> Result<(), Error> {
    let args = Args::parse();

    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    let client = ClientBuilder::new()
        .timeout(Duration::from_secs(args.timeout))
        .try_build(|sink| HttpTransport::new(HttpOptions::new(args.endpoint.clone()), sink))?;

    match args.command {
        Command::Ping => {
            if !client.transport().ping() {
                return Err(Error::Unreachable(args.endpoint));
            }
            info!("{} is alive", args.endpoint);
        }
        Command::Call {
            uri,
            method,
            args: call_args,
        } => {
            let proxy = client
                .remote(uri)
                .call(method, call_args.iter().map(|arg| parse_argument(arg)));
            debug!("Evaluating {}{}", proxy.uri(), proxy.invocation_path());

            match client.evaluate(&proxy)? {
                Outcome::Value(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                Outcome::Proxy(remote) => println!("<remote object {}>", remote.uri()),
            }
        }
    }

    Ok(())
}
