//! chat-relay CLI: inspect token accounting and conversation eviction offline
//!
//! Usage:
//!   chat-relay-cli profile <model>                   Show the resolved cost profile
//!   chat-relay-cli count <model> <text>              Price a single user message
//!   chat-relay-cli simulate <model> <budget> [file]  Replay one user message per line

use anyhow::{bail, Context};
use chat_relay::tokens::MessageCostModel;
use chat_relay::{Conversation, Message};
use std::io::{self, BufRead, BufReader};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "profile" => cmd_profile(&args[2..]),
        "count" => cmd_count(&args[2..]),
        "simulate" => cmd_simulate(&args[2..]),
        "version" | "--version" | "-V" => {
            println!("chat-relay-cli {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"chat-relay-cli: token accounting for conversation windows

USAGE:
    chat-relay-cli <COMMAND> [ARGS]

COMMANDS:
    profile <model>                   Show the cost profile a model resolves to
    count <model> <text>              Price <text> as a single user message
    simulate <model> <budget> [file]  Append each line of [file] (or stdin) as a
                                      user message and evict down to <budget>
    version                           Show version information
    help                              Show this help message

ENVIRONMENT:
    RUST_LOG                          Log filter (e.g. chat_relay=debug)"#
    );
}

fn cmd_profile(args: &[String]) -> anyhow::Result<()> {
    let Some(model) = args.first() else {
        bail!("usage: chat-relay-cli profile <model>");
    };
    let profile = MessageCostModel::default().resolve_profile(model)?;
    println!("model:                {}", model);
    println!("resolved as:          {}", profile.model);
    println!("encoding:             {}", profile.encoding);
    println!("tokens per message:   {}", profile.tokens_per_message);
    println!("tokens per name:      {:+}", profile.tokens_per_name);
    println!("reply priming:        {}", profile.tokens_per_reply_priming);
    Ok(())
}

fn cmd_count(args: &[String]) -> anyhow::Result<()> {
    let (Some(model), Some(_)) = (args.first(), args.get(1)) else {
        bail!("usage: chat-relay-cli count <model> <text>");
    };
    let text = args[1..].join(" ");
    let costs = MessageCostModel::default();
    let profile = costs.resolve_profile(model)?;
    let message = Message::user(text);
    let stored = costs.cost(&message, &profile)?;
    let request = costs.request_cost(std::slice::from_ref(&message), &profile)?;
    println!("stored cost:   {}", stored);
    println!("request cost:  {}", request);
    Ok(())
}

fn cmd_simulate(args: &[String]) -> anyhow::Result<()> {
    let (Some(model), Some(budget)) = (args.first(), args.get(1)) else {
        bail!("usage: chat-relay-cli simulate <model> <budget> [file]");
    };
    let budget: usize = budget
        .parse()
        .with_context(|| format!("budget must be a non-negative integer, got '{}'", budget))?;

    let reader: Box<dyn BufRead> = match args.get(2) {
        Some(path) => Box::new(BufReader::new(
            std::fs::File::open(path).with_context(|| format!("cannot open {}", path))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let costs = MessageCostModel::default();
    let profile = costs.resolve_profile(model)?;
    let mut conversation = Conversation::new();

    for (step, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let message = Message::user(line);
        let standalone = costs.request_cost(std::slice::from_ref(&message), &profile)?;
        if standalone > budget {
            println!("#{:<4} rejected   cost={:<6} (exceeds budget alone)", step + 1, standalone);
            continue;
        }
        let cost = conversation.append(message, &costs, &profile)?;
        let evicted = conversation.evict_until_within_budget(budget, &costs, &profile)?;
        println!(
            "#{:<4} appended   cost={:<6} evicted={:<3} window={:<3} total={}",
            step + 1,
            cost,
            evicted.len(),
            conversation.len(),
            conversation.total_tokens()
        );
    }

    println!();
    println!(
        "final window: {} message(s), {} tokens stored, {} tokens per request",
        conversation.len(),
        conversation.total_tokens(),
        conversation.total_tokens() + profile.tokens_per_reply_priming
    );
    Ok(())
}
