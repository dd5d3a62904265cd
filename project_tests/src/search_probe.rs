use anyhow::{Context, Result};
use clap::Parser;
use lib_common::api::WireRecord;
use std::time::Instant;

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about = "Stream a search from a records server and report truncation",
    long_about = None
)]
struct Args {
    /// Base URL of the records server
    #[clap(short, long, default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Substring to search for
    #[clap(short, long, default_value = "")]
    query: String,

    #[clap(long, default_value = "admin")]
    user: String,

    #[clap(long, default_value = "admin")]
    password: String,

    /// Pause between chunk reads, to simulate a slow consumer
    #[clap(long, default_value_t = 0)]
    read_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = reqwest::Client::new();

    let started = Instant::now();
    let mut response = client
        .get(format!("{}/search", args.url.trim_end_matches('/')))
        .query(&[("q", args.query.as_str())])
        .basic_auth(&args.user, Some(&args.password))
        .send()
        .await
        .context("search request failed")?;

    let status = response.status();
    println!("status: {}", status);
    if !status.is_success() {
        println!("body: {}", response.text().await.unwrap_or_default());
        return Ok(());
    }

    let mut body = Vec::new();
    let mut chunks = 0usize;
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                chunks += 1;
                if chunks == 1 {
                    println!("first chunk after {:?}", started.elapsed());
                }
                body.extend_from_slice(&chunk);
            }
            Ok(None) => break,
            Err(e) => {
                println!("stream error after {} chunks: {}", chunks, e);
                break;
            }
        }
        if args.read_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(args.read_delay_ms)).await;
        }
    }

    println!("chunks: {}, bytes: {}, elapsed: {:?}", chunks, body.len(), started.elapsed());
    match serde_json::from_slice::<Vec<WireRecord>>(&body) {
        Ok(records) => println!("complete array with {} records", records.len()),
        Err(_) => println!("truncated: array was not terminated"),
    }
    Ok(())
}
