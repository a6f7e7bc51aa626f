//! # Moim CLI
//!
//! Walkthroughs of shared RSVP and poll documents on the Moim SDK.
//! Every "device" is a `Client` with its own connection id and a display name;
//! all devices share one in-memory store with last-writer-wins field writes.
//!
//! ## Identity model
//!
//! ```text
//! connection id   one per device (phone, laptop, ...)
//! display name    one per person; every device using it is the same voter
//! ```

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;

use chrono::{Days, Local, NaiveDate};
use clap::{Parser, Subcommand};
use colored::*;
use moim_core::{Event, OptionId, Poll, PollOption, Response};
use moim_sdk::{Client, ClientConfigBuilder, MemoryStore, SdkError};
use moim_store::{Document, DocumentId};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "moim-cli")]
#[command(about = "Shared RSVP and poll reconciliation walkthroughs (Moim SDK)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Basic demo: three people RSVP to an event and vote in a poll
    Demo,
    /// Device switch: one person answers from a phone, then from a laptop
    Devices,
    /// Lost update: two devices write from the same snapshot
    Race {
        /// Race on a multi-choice poll instead of a single-choice one
        #[arg(long)]
        multi: bool,
    },
    /// Poll expiry: votes are refused once the end date has passed
    Expiry {
        /// Days until the poll closes (negative means already closed)
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        closes_in: i64,
    },
    /// Interactive REPL for manual experimentation
    Interactive,
}

// ─── Devices ───────────────────────────────────────────────────────────────

fn device(store: &Arc<MemoryStore>, connection: &str, name: &str) -> Client<MemoryStore> {
    Client::new(
        store.clone(),
        ClientConfigBuilder::new()
            .connection_id(connection)
            .display_name(name)
            .build(),
    )
}

fn lunch_poll(multiple: bool) -> Poll {
    Poll::new(
        DocumentId::new().as_str(),
        "Where do we eat after the hike?",
        vec![
            PollOption::new("noodles", "Noodle bar"),
            PollOption::new("bbq", "Korean BBQ"),
            PollOption::new("picnic", "Picnic at the top"),
        ],
    )
    .allow_multiple(multiple)
}

// ─── Pretty printing ──────────────────────────────────────────────────────

fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("\n{}", bar.bright_cyan());
    println!("  {}", text.bold().bright_white());
    println!("{}", bar.bright_cyan());
}

fn section(text: &str) {
    println!("\n{} {}", "▸".bright_yellow(), text.bold());
}

fn step(text: &str) {
    println!("  {} {}", "•".bright_green(), text);
}

fn refused(text: &str, err: &SdkError) {
    println!("  {} {} ({})", "✗".bright_red(), text, err.to_string().dimmed());
}

fn show_event(event: &Event) {
    let border = "─".repeat(44);
    let roster = event.roster();
    println!("  ┌{}┐", border);
    println!(
        "  │ {:^42} │",
        format!("{} ({})", event.title, event.date).bright_yellow().to_string()
    );
    println!("  ├{}┤", border);
    for (label, names) in [
        ("attending", &roster.attending),
        ("not attending", &roster.not_attending),
        ("undecided", &roster.undecided),
    ] {
        let list: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
        let line = format!("{:<14} {}", label, list.join(", "));
        println!("  │ {:<42} │", line);
    }
    println!("  └{}┘", border);
}

fn show_poll(poll: &Poll) {
    let border = "─".repeat(44);
    let results = poll.results();
    println!("  ┌{}┐", border);
    println!("  │ {:^42} │", poll.question.bright_yellow().to_string());
    println!("  ├{}┤", border);
    for option in &results.options {
        let names = option
            .voters
            .as_ref()
            .map(|v| v.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        let line = format!("{:<18} {:>2} {:>5.1}%  {}", option.text, option.votes, option.percentage, names);
        println!("  │ {:<42} │", line);
    }
    println!("  ├{}┤", border);
    let line = format!(
        "total {}  voters {}  {}",
        results.total_votes,
        results.voter_count,
        if poll.allow_multiple { "multi" } else { "single" }
    );
    println!("  │ {:<42} │", line);
    println!("  └{}┘", border);
}

fn consistency_result(document: &Document) {
    match document.check_invariants() {
        Ok(()) => println!(
            "\n  {} {}",
            "✓".bright_green().bold(),
            "INVARIANTS HOLD: tallies and rosters agree".bright_green().bold()
        ),
        Err(violation) => println!(
            "\n  {} {} {}",
            "✗".bright_red().bold(),
            "INVARIANT VIOLATED:".bright_red().bold(),
            violation
        ),
    }
}

// ─── Demo ──────────────────────────────────────────────────────────────────

async fn run_demo() -> Result<(), SdkError> {
    header("DEMO: RSVP and Poll on a Shared Store");

    let store = Arc::new(MemoryStore::default());
    let kim = device(&store, "kim-phone", "Kim");
    let lee = device(&store, "lee-phone", "Lee");
    let jiwoon = device(&store, "jiwoon-pc", "지운");

    section("Phase 1: RSVP");
    let date = Local::now().date_naive() + Days::new(14);
    let event_id = kim.create_event("Bukhansan hike", date).await?;
    kim.rsvp(&event_id, Response::Attend).await?;
    step("Kim: attend");
    lee.rsvp(&event_id, Response::Undecided).await?;
    step("Lee: undecided");
    jiwoon.rsvp(&event_id, Response::Attend).await?;
    step("지운: attend");
    let event = lee.rsvp(&event_id, Response::Attend).await?;
    step("Lee: changes to attend");
    show_event(&event);

    section("Phase 2: Re-clicking withdraws");
    let event = kim.rsvp(&event_id, Response::Attend).await?;
    step("Kim: attend again, answer withdrawn");
    show_event(&event);

    section("Phase 3: Single-choice poll");
    let poll_id = kim.create(lunch_poll(false)).await?;
    kim.vote(&poll_id, &OptionId::new("noodles")).await?;
    step("Kim: noodles");
    lee.vote(&poll_id, &OptionId::new("bbq")).await?;
    step("Lee: bbq");
    jiwoon.vote(&poll_id, &OptionId::new("bbq")).await?;
    step("지운: bbq");
    let poll = kim.vote(&poll_id, &OptionId::new("bbq")).await?;
    step("Kim: switches to bbq");
    show_poll(&poll);

    consistency_result(&Document::Poll(poll));
    Ok(())
}

// ─── Device switch ─────────────────────────────────────────────────────────

async fn run_devices() -> Result<(), SdkError> {
    header("DEVICES: One Name, Many Connections");

    let store = Arc::new(MemoryStore::default());
    let phone = device(&store, "phone", "지운");
    let laptop = device(&store, "laptop", "지운");
    let mut tablet = device(&store, "tablet", "Jiwoon");

    section("Phase 1: Answer from the phone, then the laptop");
    let event_id = phone
        .create_event("Team dinner", Local::now().date_naive() + Days::new(3))
        .await?;
    phone.rsvp(&event_id, Response::Attend).await?;
    step("phone  (지운): attend");
    let event = laptop.rsvp(&event_id, Response::NotAttend).await?;
    step("laptop (지운): not attend, replaces the phone's answer");
    show_event(&event);
    step(&format!("records held: {}", event.display_name_of.len()));

    section("Phase 2: Vote from both devices");
    let poll_id = phone.create(lunch_poll(false)).await?;
    phone.vote(&poll_id, &OptionId::new("noodles")).await?;
    step("phone  (지운): noodles");
    let poll = laptop.vote(&poll_id, &OptionId::new("picnic")).await?;
    step("laptop (지운): picnic, still one vote");
    show_poll(&poll);

    section("Phase 3: Rename on a third device");
    tablet.vote(&poll_id, &OptionId::new("bbq")).await?;
    step("tablet (Jiwoon): bbq, a different name counts separately");
    tablet.set_display_name("지운");
    let poll = tablet.vote(&poll_id, &OptionId::new("noodles")).await?;
    step("tablet renamed to 지운: noodles, every record for both names collapses");
    show_poll(&poll);

    consistency_result(&Document::Poll(poll));
    Ok(())
}

// ─── Race ──────────────────────────────────────────────────────────────────

async fn run_race(multi: bool) -> Result<(), SdkError> {
    header("RACE: Two Writers, One Snapshot");

    let store = Arc::new(MemoryStore::default());
    let kim = device(&store, "kim-phone", "Kim");
    let lee = device(&store, "lee-laptop", "Lee");
    let poll_id = kim.create(lunch_poll(multi)).await?;

    section("Phase 1: Both devices read the same snapshot");
    let snapshot = kim.poll(&poll_id).await?;
    show_poll(&snapshot);

    section("Phase 2: Each computes its vote locally");
    let by_kim = kim.compute_vote(&snapshot, &OptionId::new("noodles"))?;
    step("Kim: noodles (not yet written)");
    let by_lee = lee.compute_vote(&snapshot, &OptionId::new("bbq"))?;
    step("Lee: bbq (not yet written)");

    section("Phase 3: Both write; the later write wins every field it touches");
    let before = Document::Poll(snapshot);
    kim.commit(&poll_id, &before, Document::Poll(by_kim)).await?;
    step("Kim writes");
    lee.commit(&poll_id, &before, Document::Poll(by_lee)).await?;
    step("Lee writes");

    let poll = kim.poll(&poll_id).await?;
    show_poll(&poll);
    if poll.total_votes < 2 {
        println!(
            "  {} {}",
            "!".bright_yellow().bold(),
            "Kim's vote was lost: there is no compare-and-swap".bright_yellow()
        );
    }

    consistency_result(&Document::Poll(poll));
    Ok(())
}

// ─── Expiry ────────────────────────────────────────────────────────────────

async fn run_expiry(closes_in: i64) -> Result<(), SdkError> {
    header("EXPIRY: Votes After the End Date");

    let today = Local::now().date_naive();
    let end_date = shift(today, closes_in);
    let store = Arc::new(MemoryStore::default());
    let kim = Client::new(
        store.clone(),
        ClientConfigBuilder::new()
            .connection_id("kim-phone")
            .display_name("Kim")
            .today(today)
            .build(),
    );

    section(&format!("Poll closes on {}, today is {}", end_date, today));
    let poll_id = kim.create(lunch_poll(false).closes_on(end_date)).await?;

    match kim.vote(&poll_id, &OptionId::new("picnic")).await {
        Ok(poll) => {
            step("Kim: picnic, accepted");
            show_poll(&poll);
        }
        Err(err) => {
            refused("Kim: picnic", &err);
            show_poll(&kim.poll(&poll_id).await?);
        }
    }
    Ok(())
}

fn shift(date: NaiveDate, days: i64) -> NaiveDate {
    let magnitude = Days::new(days.unsigned_abs());
    let shifted = if days >= 0 {
        date.checked_add_days(magnitude)
    } else {
        date.checked_sub_days(magnitude)
    };
    shifted.unwrap_or(date)
}

// ─── Interactive REPL ──────────────────────────────────────────────────────

async fn run_interactive() -> Result<(), SdkError> {
    header("INTERACTIVE REPL: Moim Shared Store");

    let store = Arc::new(MemoryStore::default());
    let mut devices: BTreeMap<String, Client<MemoryStore>> = BTreeMap::new();
    let seed = device(&store, "seed", "seed");
    let event_id = seed
        .create_event("Open event", Local::now().date_naive() + Days::new(7))
        .await?;
    let poll_id = seed.create(lunch_poll(false).allow_add_options(true)).await?;

    println!();
    println!("  {}", "Commands:".bold().underline());
    println!("    {} <id> <name>            Create or rename a device", "device".bright_cyan());
    println!("    {} <id> <answer>            attend | no | maybe", "rsvp".bright_cyan());
    println!("    {} <id> <option>            Vote in the poll", "vote".bright_cyan());
    println!("    {} <id> <text>               Add a poll option", "add".bright_cyan());
    println!("    {}                          Show event and poll", "show".bright_cyan());
    println!("    {}                          Show raw JSON documents", "dump".bright_cyan());
    println!("    {}                          Exit", "quit".bright_cyan());
    println!();

    loop {
        print!("{}", "moim> ".bright_cyan().bold());
        if io::stdout().flush().is_err() {
            break;
        }

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() || input.is_empty() {
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0] {
            "device" | "d" => {
                if parts.len() < 3 {
                    println!("  {} Usage: device <id> <name>", "!".bright_red());
                    continue;
                }
                let name = parts[2..].join(" ");
                match devices.get_mut(parts[1]) {
                    Some(client) => {
                        client.set_display_name(name.as_str());
                        step(&format!("Device '{}' is now '{}'", parts[1], name));
                    }
                    None => {
                        devices.insert(parts[1].to_string(), device(&store, parts[1], &name));
                        step(&format!("Created device '{}' as '{}'", parts[1], name));
                    }
                }
            }

            "rsvp" => {
                if parts.len() < 3 {
                    println!("  {} Usage: rsvp <id> <answer>", "!".bright_red());
                    continue;
                }
                let response: Response = match parts[2].parse() {
                    Ok(r) => r,
                    Err(e) => {
                        println!("  {} {}", "!".bright_red(), e);
                        continue;
                    }
                };
                let Some(client) = devices.get(parts[1]) else {
                    println!("  {} Device '{}' not found", "!".bright_red(), parts[1]);
                    continue;
                };
                match client.rsvp(&event_id, response).await {
                    Ok(event) => show_event(&event),
                    Err(err) => refused("rsvp", &err),
                }
            }

            "vote" | "v" => {
                if parts.len() < 3 {
                    println!("  {} Usage: vote <id> <option>", "!".bright_red());
                    continue;
                }
                let Some(client) = devices.get(parts[1]) else {
                    println!("  {} Device '{}' not found", "!".bright_red(), parts[1]);
                    continue;
                };
                match client.vote(&poll_id, &OptionId::new(parts[2])).await {
                    Ok(poll) => show_poll(&poll),
                    Err(err) => refused("vote", &err),
                }
            }

            "add" => {
                if parts.len() < 3 {
                    println!("  {} Usage: add <id> <text>", "!".bright_red());
                    continue;
                }
                let Some(client) = devices.get(parts[1]) else {
                    println!("  {} Device '{}' not found", "!".bright_red(), parts[1]);
                    continue;
                };
                match client.add_option(&poll_id, &parts[2..].join(" ")).await {
                    Ok(poll) => {
                        if let Some(added) = poll.options.last() {
                            step(&format!("Added option '{}' as {}", added.text, added.id));
                        }
                    }
                    Err(err) => refused("add", &err),
                }
            }

            "show" | "s" => {
                show_event(&seed.event(&event_id).await?);
                show_poll(&seed.poll(&poll_id).await?);
            }

            "dump" => {
                let json = store.inspect(|s| s.snapshot());
                match json {
                    Ok(json) => println!("{}", json),
                    Err(e) => println!("  {} {}", "!".bright_red(), e),
                }
            }

            "quit" | "exit" | "q" => break,

            "help" | "h" | "?" => {
                println!("  device <id> <name> | rsvp <id> <answer> | vote <id> <option>");
                println!("  add <id> <text> | show | dump | quit");
            }

            other => {
                println!("  {} Unknown command '{}', type 'help'", "?".bright_yellow(), other);
            }
        }
    }
    Ok(())
}

// ─── Entry point ───────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moim=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Demo => run_demo().await,
        Commands::Devices => run_devices().await,
        Commands::Race { multi } => run_race(multi).await,
        Commands::Expiry { closes_in } => run_expiry(closes_in).await,
        Commands::Interactive => run_interactive().await,
    };

    if let Err(err) = outcome {
        eprintln!("{} {}", "error:".bright_red().bold(), err);
        std::process::exit(1);
    }
}
