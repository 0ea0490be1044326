use crate::configuration::Configuration;
use crate::error::{WordbookError, WordbookResult};
use tracing::{info, instrument};

mod cli;
mod configuration;
mod database;
mod error;
mod integration_tests;
mod job_queue;
mod web;

#[instrument(err, skip(configuration))]
fn setup_tracing_subscriber(configuration: &Configuration) -> WordbookResult<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::Resource;
    use tracing::subscriber::set_global_default;
    use tracing_subscriber::fmt::Layer;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    let logging_layer = Layer::default().json().with_span_list(true);
    let subscriber = Registry::default().with(logging_layer);

    let with_otel = if let Some(opentelemetry_url) = configuration.opentelemetry_url.as_ref() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_trace_config(opentelemetry_sdk::trace::config().with_resource(
                Resource::new(vec![KeyValue::new("service.name", "wordbook-backend")]),
            ))
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(opentelemetry_url),
            )
            .install_batch(opentelemetry_sdk::runtime::TokioCurrentThread)
            .map_err(|error| WordbookError::SetupTracing {
                source: Box::new(error),
            })?;

        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

        set_global_default(subscriber.with(otel_layer)).map(|_| true)
    } else {
        set_global_default(subscriber).map(|_| false)
    }
    .map_err(|error| WordbookError::SetupTracing {
        source: Box::new(error),
    })?;

    info!(
        "Set up tracing subscriber successfully {}",
        if with_otel {
            "including opentelemetry"
        } else {
            "without opentelemetry"
        }
    );

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
pub async fn main() -> WordbookResult<()> {
    // Load configuration
    let configuration = Configuration::from_environment()?;

    setup_tracing_subscriber(&configuration)?;

    cli::run_cli_command(&configuration).await?;

    if configuration.opentelemetry_url.is_some() {
        opentelemetry::global::shutdown_tracer_provider();
    }

    Ok(())
}
