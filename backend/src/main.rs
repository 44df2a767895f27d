use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use studyplanner_backend::{
    config::Config,
    db::connection::{create_pool, DbPool},
    repositories::{
        NotificationRepository, NotificationRepositoryTrait, ScheduleRepository,
        ScheduleRepositoryTrait,
    },
    services::{NotificationScheduler, ReminderDispatcher, TimerRegistry},
    utils::email::EmailService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studyplanner_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        database_url = %config.database_url,
        time_zone = %config.time_zone,
        reminder_offsets = ?config.reminder_offsets,
        "Loaded configuration from environment/.env"
    );

    // Initialize database
    let pool: DbPool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&*pool).await?;

    // Wire the notification engine
    let schedules: Arc<dyn ScheduleRepositoryTrait> =
        Arc::new(ScheduleRepository::new(pool.clone()));
    let notifications: Arc<dyn NotificationRepositoryTrait> =
        Arc::new(NotificationRepository::new(pool.clone()));
    let dispatcher: Arc<dyn ReminderDispatcher> = Arc::new(EmailService::new()?);
    let engine = NotificationScheduler::new(
        schedules,
        notifications,
        dispatcher,
        TimerRegistry::new(),
        config.time_zone,
        config.reminder_offsets.clone(),
    );

    // Rebuild the armed timer set from the store before anything else runs.
    engine.init().await?;
    tracing::info!("notification engine ready");

    tokio::signal::ctrl_c().await?;
    engine.shutdown();

    Ok(())
}
