use stress_test::{stress_test_poll, stress_test_rsvp, stress_test_scaling, StressConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moim=info,moim_sdk=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start runtime: {}", err);
            std::process::exit(1);
        }
    };
    if !rt.block_on(async_main()) {
        std::process::exit(1);
    }
}

async fn async_main() -> bool {
    let mut held = true;

    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            CONCURRENT DEVICE STRESS TESTS                   ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    // Test 1: RSVP with few devices per name
    let stats = stress_test_rsvp(StressConfig::default().with_devices(4).with_names(2)).await;
    stats.print();
    held &= stats.held();

    // Test 2: single-choice poll
    let stats = stress_test_poll(StressConfig::default()).await;
    stats.print();
    held &= stats.held();

    // Test 3: RSVP at medium scale
    let stats = stress_test_rsvp(
        StressConfig::default()
            .with_devices(16)
            .with_names(5)
            .with_ops(300),
    )
    .await;
    stats.print();
    held &= stats.held();

    // Test 4: multi-choice poll at medium scale
    let stats = stress_test_poll(
        StressConfig::default()
            .with_devices(16)
            .with_names(5)
            .with_ops(300)
            .multi_choice(true),
    )
    .await;
    stats.print();
    held &= stats.held();

    // Test 5: Scaling analysis
    held &= stress_test_scaling(20, 4).await;

    if held {
        println!("\n✓ All stress tests held their invariants!");
    } else {
        println!("\n✗ Invariant violations detected");
    }
    held
}
