//! A minimal line-protocol client for manual smoke testing: splits each
//! line of stdin on whitespace into a command, sends it, prints the
//! reply, repeats.
//!
//! `clap`-free for the same reason as `bin/server.rs` — one positional
//! address argument doesn't earn a dependency.

use std::io::{self, BufRead, Write as _};

use bytes::Bytes;
use ferrikv::protocol::{ParseItem, Parser};
use ferrikv::reply::Reply;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let address = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1:6379".to_string());
    let stream = TcpStream::connect(&address).await?;
    println!("connected to {address}");
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut parser = Parser::new(BufReader::new(read_half));

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let args: Vec<Bytes> = line
            .split_whitespace()
            .map(|s| Bytes::copy_from_slice(s.as_bytes()))
            .collect();
        if args.is_empty() {
            continue;
        }

        write_half.write_all(&Reply::array_of_bulks(args).to_bytes()).await?;

        match parser.next().await {
            Some(ParseItem::Reply(reply)) => print_reply(&reply, 0),
            Some(ParseItem::Error(err)) => println!("(protocol error) {err}"),
            None => {
                println!("connection closed by server");
                break;
            }
        }
    }
    Ok(())
}

fn print_reply(reply: &Reply, depth: usize) {
    let indent = "  ".repeat(depth);
    match reply {
        Reply::SimpleString(s) => println!("{indent}+{}", String::from_utf8_lossy(s)),
        Reply::Error(s) => println!("{indent}(error) {}", String::from_utf8_lossy(s)),
        Reply::Integer(n) => println!("{indent}(integer) {n}"),
        Reply::Bulk(None) => println!("{indent}(nil)"),
        Reply::Bulk(Some(b)) => println!("{indent}\"{}\"", String::from_utf8_lossy(b)),
        Reply::Array(None) => println!("{indent}(nil)"),
        Reply::Array(Some(items)) => {
            if items.is_empty() {
                println!("{indent}(empty array)");
                return;
            }
            for (i, item) in items.iter().enumerate() {
                println!("{indent}{}) ", i + 1);
                print_reply(item, depth + 1);
            }
        }
    }
}
