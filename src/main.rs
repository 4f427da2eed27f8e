//! CLI interface for rust-wander

use clap::{Parser, Subcommand};
use rust_wander::planner::{flight_options, hotel_options, sorted_days};
use rust_wander::store::{FLIGHT_FILE, HOTEL_FILE};
use rust_wander::{chat_turn, Config, ItineraryRequest, SessionStore, TravelPlanner, TravelSelection};
use std::io::{self, BufRead, Write};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "rust-wander")]
#[command(about = "Plan trips with SerpApi flight/hotel search and Gemini")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search flights and hotels and save the results
    Search {
        /// Departure airport code
        #[arg(short, long)]
        from: String,
        /// Arrival airport code
        #[arg(short, long)]
        to: String,
        /// Outbound date (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,
        /// Return date (YYYY-MM-DD)
        #[arg(short, long)]
        return_date: String,
        /// Hotel search query, e.g. "Hotels in Austin" (derived from the arrival airport if omitted)
        #[arg(long)]
        hotel_query: Option<String>,
    },
    /// Chat with the travel assistant until it recommends destinations
    Chat {
        /// Session identifier
        #[arg(long, default_value = "default")]
        session: String,
    },
    /// Generate an itinerary from previously saved search results
    Itinerary {
        /// Outbound date (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,
        /// Return date (YYYY-MM-DD)
        #[arg(short, long)]
        return_date: String,
        /// Flight option to use (1-3)
        #[arg(long, default_value = "1")]
        flight: usize,
        /// Hotel option to use (1-3)
        #[arg(long, default_value = "1")]
        hotel: usize,
        /// Travel preferences
        #[arg(short, long)]
        preferences: Option<String>,
    },
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

fn pick(options: &[serde_json::Value], choice: usize, kind: &str) -> anyhow::Result<serde_json::Value> {
    if options.is_empty() {
        anyhow::bail!("No {} options found in saved results", kind);
    }
    choice
        .checked_sub(1)
        .and_then(|i| options.get(i))
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Select a {} option between 1 and {}", kind, options.len()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Search {
            from,
            to,
            date,
            return_date,
            hotel_query,
        } => {
            let planner = TravelPlanner::from_config(&config)?;
            let selection = TravelSelection {
                departure_id: Some(from),
                arrival_id: Some(to),
                outbound_date: Some(date),
                return_date: Some(return_date),
                hotel_query,
            }
            .with_default_hotel_query();

            println!("Searching for flights and hotels...");
            let data = planner.fetch_travel_data(&selection).await?;

            println!("\nSummary:");
            println!("Flight data saved to {}", data.flight_path.display());
            println!("Hotel data saved to {}", data.hotel_path.display());
            if !data.flights_genuine {
                println!("No live flight data found; sample flights were saved instead");
            }
            for (i, option) in flight_options(&data.flight_data).iter().enumerate() {
                println!("Flight option {}: {} USD", i + 1, option["price"]);
            }
            for (i, hotel) in hotel_options(&data.hotel_data).iter().enumerate() {
                println!(
                    "Hotel option {}: {} ({} USD/night)",
                    i + 1,
                    hotel["name"],
                    hotel["rate_per_night"]["extracted_lowest"]
                );
            }
        }
        Commands::Chat { session } => {
            let planner = TravelPlanner::from_config(&config)?;
            let generator = planner.generator()?;
            let mut store = SessionStore::new();
            let stdin = io::stdin();

            println!("Chatbot is ready. Type 'exit' to quit.");
            loop {
                print!("You: ");
                io::stdout().flush()?;

                let mut line = String::new();
                if stdin.lock().read_line(&mut line)? == 0 {
                    break;
                }
                let message = line.trim();
                if message.eq_ignore_ascii_case("exit") {
                    break;
                }
                if message.is_empty() {
                    continue;
                }

                match chat_turn(&mut store, generator, &session, message).await {
                    Ok(reply) if reply.is_recommendation => {
                        let data = reply.recommendation_data.unwrap_or_default();
                        println!("\nRecommendation:\n{}", serde_json::to_string_pretty(&data)?);
                        break;
                    }
                    Ok(reply) => println!("Assistant: {}", reply.response),
                    Err(e) => eprintln!("Error talking to the assistant: {}", e),
                }
            }
        }
        Commands::Itinerary {
            date,
            return_date,
            flight,
            hotel,
            preferences,
        } => {
            let planner = TravelPlanner::from_config(&config)?;
            let flight_data = planner.store().load_json(FLIGHT_FILE)?;
            let hotel_data = planner.store().load_json(HOTEL_FILE)?;

            let request = ItineraryRequest {
                selected_flight: Some(pick(&flight_options(&flight_data), flight, "flight")?),
                selected_hotel: Some(pick(&hotel_options(&hotel_data), hotel, "hotel")?),
                outbound_date: Some(date),
                return_date: Some(return_date),
                user_preferences: preferences,
            };

            println!("Generating itinerary...");
            let itinerary = planner.generate_itinerary(&request).await?;

            for (n, day) in sorted_days(&itinerary) {
                println!(
                    "Day {}: {} ({})",
                    n,
                    day["title"].as_str().unwrap_or("Untitled"),
                    day["date"].as_str().unwrap_or("no date")
                );
            }
            if let Some(total) = itinerary.get("total_cost") {
                println!("Total cost: {}", total);
            }
        }
    }

    Ok(())
}
