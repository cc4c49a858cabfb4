use std::sync::Arc;

use serde_json::json;
use splitio_reactive::{
    config::{LocalhostFeature, SplitConfig},
    localhost::LocalhostFactory,
    models::SplitKey,
    SplitService,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let factory = Arc::new(LocalhostFactory::new());
    let mut config = SplitConfig::new("localhost", "user-1")
        .with_feature("new_checkout", LocalhostFeature::from("on"))
        .with_feature(
            "banner",
            LocalhostFeature::WithConfig {
                treatment: "blue".to_string(),
                config: Some(r#"{"text":"hello"}"#.to_string()),
                sets: vec!["front".to_string()],
            },
        );
    config.debug = true;
    let service = SplitService::provide(factory.clone(), config);

    service.ready().await?;
    println!("{:?}", service.get_treatment(&[json!("new_checkout")]));
    println!(
        "{:?}",
        service.get_treatments_with_config_by_flag_set(&[json!("front")])
    );

    let other = SplitKey::from("user-2");
    let mut ready = service.create_client(&other);
    if let Some(res) = ready.next().await {
        res?;
    }
    println!(
        "{:?}",
        service.get_treatment(&[json!("user-2"), json!("banner")])
    );
    println!(
        "{:?}",
        service.track(&[json!("user-2"), json!("user"), json!("purchase"), json!(9.99)])
    );

    let mut updates = service.sdk_update();
    if let Some(sdk) = factory.sdk() {
        sdk.set_feature("new_checkout", LocalhostFeature::from("off"));
    }
    if let Some(res) = updates.next().await {
        res?;
    }
    println!("{:?}", service.get_treatment(&[json!("new_checkout")]));

    service.destroy().await?;
    println!("{:?}", service.get_treatment(&[json!("new_checkout")]));
    Ok(())
}
