use anyhow::{Context, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

use relay_chat::protocol::{DEFAULT_PORT, QUIT_SENTINEL};
use relay_chat::{ChatClient, logging};

/// Terminal client for the relay chat server.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Server IP address
    server: IpAddr,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, label: &str) -> Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;

    let line = lines.next_line().await?.context("stdin closed")?;
    Ok(line.trim_end().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init("warn");

    let addr = SocketAddr::new(args.server, args.port);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let id = prompt(&mut lines, "id: ").await?;
    let password = prompt(&mut lines, "password: ").await?;

    let client = ChatClient::connect(addr, &id, &password).await?;
    println!("logged in as '{}'. type '{}' to leave.", client.id(), QUIT_SENTINEL);

    let (mut reader, mut writer) = client.into_split();

    loop {
        tokio::select! {
            // Branch A: message relayed from another client
            incoming = reader.recv() => match incoming? {
                Some(msg) => println!("{}: {}", msg.sender(), msg.content()),
                None => {
                    println!("server closed the connection");
                    break;
                }
            },

            // Branch B: a line typed by the user
            line = lines.next_line() => match line? {
                Some(line) => {
                    let line = line.trim_end();
                    if line.is_empty() {
                        continue;
                    }
                    if line == QUIT_SENTINEL {
                        writer.quit().await?;
                        break;
                    }
                    writer.send(line).await?;
                }
                None => {
                    writer.quit().await?;
                    break;
                }
            },

            _ = tokio::signal::ctrl_c() => {
                writer.quit().await?;
                break;
            }
        }
    }

    Ok(())
}
