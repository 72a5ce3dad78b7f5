use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use scheduled_backup::{AdminConfig, BackupHandler, PubSubMessage};
use tracing::info;

async fn function_handler(
    handler: &BackupHandler,
    event: LambdaEvent<PubSubMessage>,
) -> Result<(), Error> {
    if let Some(message_id) = &event.payload.message_id {
        info!("Handling message {}", message_id);
    }

    handler.handle(&event.payload).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    // Built once per process; a failed build is not retried.
    let handler = BackupHandler::connect(AdminConfig::from_env()).await;

    run(service_fn(move |event: LambdaEvent<PubSubMessage>| {
        let handler = handler.clone();
        async move { function_handler(&handler, event).await }
    }))
    .await
}
