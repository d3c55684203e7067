//! Prints the trip as this device sees it: the itinerary with completion marks, and everyone's
//! packing progress. Optionally toggles an activity first.
//!
//! ```text
//! trip-status
//! trip-status toggle <activity-id> <name>
//! ```

#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let config = match trip_frontend_rs::TripConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let local = tokio::task::LocalSet::new();
    local.run_until(native::run(config)).await;
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::{rc::Rc, time::Duration};

    use futures::future::LocalBoxFuture;
    use tandem::{MutationOutcome, Spawner};
    use trip_frontend_rs::{ActivityId, Trip, TripConfig, packing};

    const LOAD_TIMEOUT: Duration = Duration::from_secs(10);

    pub async fn run(config: TripConfig) {
        let spawner: Spawner = Rc::new(|future: LocalBoxFuture<'static, ()>| {
            tokio::task::spawn_local(future);
        });

        let trip = match Trip::open(&config, spawner) {
            Ok(trip) => trip,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        };

        let waited = tokio::time::timeout(LOAD_TIMEOUT, async {
            while trip.loading() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        if waited.is_err() {
            eprintln!("⚠️  Timed out waiting for the remote store, showing what we have");
        }

        let args: Vec<String> = std::env::args().collect();
        match args.as_slice() {
            [_] => {}
            [_, command, id, name] if command == "toggle" => toggle(&trip, id, name).await,
            _ => {
                eprintln!("Usage: trip-status [toggle <activity-id> <name>]");
                std::process::exit(1);
            }
        }

        print_itinerary(&trip);
        print_packing(&trip);

        for (label, error) in [
            ("itinerary", trip.itinerary.error()),
            ("activities", trip.completions.error()),
            ("packing", trip.packing.error()),
        ] {
            if let Some(error) = error {
                println!("⚠️  {label} is local-only this session: {error}");
            }
        }

        trip.shutdown();
    }

    async fn toggle(trip: &Trip, id: &str, name: &str) {
        if let Err(e) = trip.select_user(name) {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }

        let id = ActivityId::new(id);
        if trip.itinerary.value().find_activity(&id).is_none() {
            eprintln!("⚠️  {id} is not in the itinerary, toggling it anyway");
        }

        match trip.toggle_activity(&id) {
            Ok(confirmation) => match confirmation.await {
                MutationOutcome::Confirmed | MutationOutcome::LocalOnly => {}
                MutationOutcome::RolledBack => eprintln!("❌ The remote store refused the change"),
                outcome => eprintln!("⚠️  {id}: {outcome:?}"),
            },
            Err(e) => eprintln!("Error: {e}"),
        }
    }

    fn print_itinerary(trip: &Trip) {
        let itinerary = trip.itinerary.value();
        let completions = trip.completions.value();

        for day in itinerary.days() {
            println!("Day {} {} {} ({})", day.day, day.emoji, day.title, day.date);
            println!("--------------");
            for activity in &day.activities {
                let mark = match completions.get(&activity.id) {
                    Some(completion) if completion.is_completed() => format!(
                        "✅ ({})",
                        completion
                            .completed_by()
                            .map(|user| user.as_str())
                            .unwrap_or("someone")
                    ),
                    _ => "  ".to_string(),
                };
                let star = if activity.highlight { " ⭐" } else { "" };
                println!(
                    "  {mark} {:<20} {}{star}  [{}]",
                    activity.time_range(),
                    activity.title,
                    activity.id
                );
            }
            println!();
        }

        let progress = completions.progress(&itinerary);
        println!(
            "Progress: {}/{} activities ({}%)",
            progress.completed, progress.total, progress.percent
        );
        println!();
    }

    fn print_packing(trip: &Trip) {
        let checklist = trip.packing.value();
        println!("Packing:");
        println!("--------");
        for user in trip.roster().iter() {
            let progress = checklist.user_progress(user);
            println!("  {user}: {}/{} packed", progress.packed, progress.total);
            for category in packing::CATALOG {
                let category_progress = checklist.category_progress(category, user);
                if category_progress.packed < category_progress.total {
                    println!(
                        "    {} {}: {}/{}",
                        category.emoji, category.name, category_progress.packed, category_progress.total
                    );
                }
            }
        }
        println!();
    }
}
