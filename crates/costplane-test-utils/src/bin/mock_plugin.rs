// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Standalone mock plugin for subprocess tests.
//!
//! Serves the wire protocol over stdio, or over TCP when launched with
//! `COSTPLANE_PLUGIN_MODE=tcp`, answering cost operations per `--behavior`.

use clap::Parser;
use costplane_host::protocol::{ENV_PLUGIN_MODE, ENV_PLUGIN_PORT};
use costplane_test_utils::{MockBehavior, MockPlugin};
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "costplane-mock-plugin", about = "Scripted Costplane plugin for tests")]
struct Cli {
    /// Name reported by the identity operation.
    #[arg(long, default_value = "mock")]
    name: String,

    /// cost:<monthly>, zero, fail:<CODE>, hang, crash, silent or delay:<ms>:<monthly>.
    #[arg(long, default_value = "cost:1")]
    behavior: MockBehavior,

    /// Port to listen on in TCP mode. Falls back to the environment.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let plugin = MockPlugin::new(cli.name, cli.behavior);

    let mode = std::env::var(ENV_PLUGIN_MODE).unwrap_or_default();
    if mode == "tcp" {
        let port = match cli.port {
            Some(port) => port,
            None => std::env::var(ENV_PLUGIN_PORT)?.parse()?,
        };
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let (stream, _) = listener.accept().await?;
        let (read, write) = stream.into_split();
        plugin.serve(read, write).await;
    } else {
        plugin.serve(tokio::io::stdin(), tokio::io::stdout()).await;
    }
    Ok(())
}
