use chrono::{Duration, Utc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use studyplanner_backend::{
    config::Config,
    db::connection::create_pool,
    repositories::{
        NotificationRepository, NotificationRepositoryTrait, ScheduleRepository,
        ScheduleRepositoryTrait,
    },
};

const EXECUTED_RETENTION_DAYS: i64 = 90;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studyplanner_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let pool = create_pool(&config.database_url).await?;

    let schedules = ScheduleRepository::new(pool.clone());
    let expired = schedules.expire_elapsed(Utc::now()).await?;
    if expired > 0 {
        tracing::info!("Marked {} elapsed schedules as expired", expired);
    }

    let notifications = NotificationRepository::new(pool.clone());
    let cutoff = Utc::now() - Duration::days(EXECUTED_RETENTION_DAYS);
    let pruned = notifications.delete_executed_before(cutoff).await?;
    if pruned > 0 {
        tracing::info!("Pruned {} executed notification rows", pruned);
    }

    sqlx::query("VACUUM (ANALYZE) scheduled_notifications")
        .execute(pool.as_ref())
        .await?;

    Ok(())
}
