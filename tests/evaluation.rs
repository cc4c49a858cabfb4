use std::collections::HashMap;

use serde_json::json;
use tracing_test::traced_test;

use splitio_reactive::{
    models::{SplitKey, TreatmentWithConfig, CONTROL},
    SplitService,
};

use common::{initialized_service, MockFactory};

pub mod common;

fn on(names: &[&str]) -> HashMap<String, String> {
    names
        .iter()
        .map(|name| (name.to_string(), "on".to_string()))
        .collect()
}

#[tokio::test]
async fn test_main_key_forms() {
    let (factory, service) = initialized_service();

    assert_eq!(service.get_treatment(&[json!("flag1")]), "on");
    assert_eq!(
        service.get_treatment(&[json!("flag1"), json!({ "plan": "pro" })]),
        "on"
    );
    assert_eq!(
        service.get_treatment(&[
            json!("flag1"),
            json!({ "plan": "pro" }),
            json!({ "properties": { "source": "web" } }),
        ]),
        "on"
    );
    assert_eq!(
        service.get_treatment(&[
            json!("flag1"),
            json!(null),
            json!({ "properties": { "source": "web" } }),
        ]),
        "on"
    );
    assert_eq!(
        service.get_treatment_with_config(&[json!("flag1")]),
        TreatmentWithConfig {
            treatment: "on".to_string(),
            config: Some("{}".to_string()),
        }
    );
    assert_eq!(
        service.get_treatments(&[json!(["flag1", "flag2"])]),
        on(&["flag1", "flag2"])
    );
    assert_eq!(
        service
            .get_treatments_with_config(&[json!(["flag1"])])
            .get("flag1")
            .map(|t| t.treatment.as_str()),
        Some("on")
    );

    assert_eq!(
        factory.sdk().main().calls(),
        vec![
            "get_treatment:flag1:false:false",
            "get_treatment:flag1:true:false",
            "get_treatment:flag1:true:true",
            "get_treatment:flag1:false:true",
            "get_treatment_with_config:flag1",
            "get_treatments:flag1,flag2",
            "get_treatments_with_config:flag1",
        ]
    );
}

#[tokio::test]
async fn test_keyed_forms_use_that_client() {
    let (factory, service) = initialized_service();
    let _ready = service.create_client(&SplitKey::from("k2"));
    let sdk = factory.sdk();

    assert_eq!(service.get_treatment(&[json!("k2"), json!("flag1")]), "on");
    assert_eq!(
        service.get_treatments(&[json!("k2"), json!(["flag1", "flag2"]), json!({ "a": 1 })]),
        on(&["flag1", "flag2"])
    );
    assert_eq!(
        service
            .get_treatment_with_config(&[json!("k2"), json!("flag1")])
            .treatment,
        "on"
    );
    assert_eq!(
        service
            .get_treatments_with_config(&[json!("k2"), json!(["flag1"])])
            .len(),
        1
    );

    assert_eq!(
        sdk.mock_client("k2").calls(),
        vec![
            "get_treatment:flag1:false:false",
            "get_treatments:flag1,flag2",
            "get_treatment_with_config:flag1",
            "get_treatments_with_config:flag1",
        ]
    );
    assert!(sdk.main().calls().is_empty());

    // The main key in keyed form reaches the main client.
    assert_eq!(
        service.get_treatment(&[json!("main-user"), json!("flag1")]),
        "on"
    );
    assert_eq!(sdk.main().calls(), vec!["get_treatment:flag1:false:false"]);
}

#[tokio::test]
#[traced_test]
async fn test_unknown_key_returns_control() {
    let (factory, service) = initialized_service();

    assert_eq!(
        service.get_treatment(&[json!("nobody"), json!("flag1")]),
        CONTROL
    );
    logs_assert(|lines: &[&str]| {
        match lines.iter().filter(|line| line.contains("nobody")).count() {
            1 => Ok(()),
            n => Err(format!("expected one diagnostic, got {}", n)),
        }
    });

    assert_eq!(
        service.get_treatments(&[json!("nobody"), json!(["a", "b"])]),
        HashMap::from([
            ("a".to_string(), CONTROL.to_string()),
            ("b".to_string(), CONTROL.to_string()),
        ])
    );
    assert_eq!(
        service.get_treatment_with_config(&[json!("nobody"), json!("flag1")]),
        TreatmentWithConfig::control()
    );
    assert!(service
        .get_treatments_by_flag_set(&[json!("nobody"), json!("front")])
        .is_empty());
    assert!(!service.track(&[json!("nobody"), json!("user"), json!("purchase")]));
    assert!(factory.sdk().main().calls().is_empty());
}

#[tokio::test]
async fn test_defaults_before_initialization() {
    let service = SplitService::new(MockFactory::new());

    assert_eq!(service.get_treatment(&[json!("flag1")]), CONTROL);
    assert_eq!(
        service.get_treatment_with_config(&[json!("flag1")]),
        TreatmentWithConfig::control()
    );
    assert_eq!(
        service.get_treatments(&[json!(["a", "b"])]),
        HashMap::from([
            ("a".to_string(), CONTROL.to_string()),
            ("b".to_string(), CONTROL.to_string()),
        ])
    );
    assert_eq!(
        service
            .get_treatments_with_config(&[json!(["a"])])
            .get("a"),
        Some(&TreatmentWithConfig::control())
    );
    assert!(service.get_treatments_by_flag_set(&[json!("front")]).is_empty());
    assert!(service
        .get_treatments_with_config_by_flag_set(&[json!("front")])
        .is_empty());
    assert!(service
        .get_treatments_by_flag_sets(&[json!(["front"])])
        .is_empty());
    assert!(service
        .get_treatments_with_config_by_flag_sets(&[json!(["front"])])
        .is_empty());
    assert!(!service.track(&[json!("user"), json!("purchase")]));

    assert!(service.get_splits().is_empty());
    assert!(service.get_split("flag1").is_none());
    assert!(service.get_split_names().is_empty());
    assert!(service.sdk_client(None).is_none());
    assert!(service.sdk_factory().is_none());
    assert!(!service.is_sdk_ready());
}

#[tokio::test]
async fn test_flag_sets() {
    let (factory, service) = initialized_service();
    let _ready = service.create_client(&SplitKey::from("k2"));
    let sdk = factory.sdk();

    assert_eq!(
        service.get_treatments_by_flag_set(&[json!("front")]),
        on(&["front_flag"])
    );
    assert_eq!(
        service
            .get_treatments_with_config_by_flag_set(&[json!("front"), json!({ "a": 1 })])
            .len(),
        1
    );
    assert_eq!(
        service.get_treatments_by_flag_sets(&[json!(["front", "back"])]),
        on(&["front_flag", "back_flag"])
    );
    assert_eq!(
        service
            .get_treatments_with_config_by_flag_sets(&[json!(["front"])])
            .len(),
        1
    );
    // A single set name is a one element list for the multi-set methods.
    assert_eq!(
        service.get_treatments_by_flag_sets(&[json!("front")]),
        on(&["front_flag"])
    );

    assert_eq!(
        service.get_treatments_by_flag_set(&[json!("k2"), json!("back")]),
        on(&["back_flag"])
    );
    assert_eq!(
        service
            .get_treatments_with_config_by_flag_sets(&[json!("k2"), json!(["a", "b"])])
            .len(),
        2
    );

    assert_eq!(
        sdk.main().calls(),
        vec![
            "get_treatments_by_flag_set:front",
            "get_treatments_with_config_by_flag_set:front",
            "get_treatments_by_flag_sets:front,back",
            "get_treatments_with_config_by_flag_sets:front",
            "get_treatments_by_flag_sets:front",
        ]
    );
    assert_eq!(
        sdk.mock_client("k2").calls(),
        vec![
            "get_treatments_by_flag_set:back",
            "get_treatments_with_config_by_flag_sets:a,b",
        ]
    );
}

#[tokio::test]
async fn test_track() {
    let (factory, service) = initialized_service();
    let _ready = service.create_client(&SplitKey::from("k2"));
    let sdk = factory.sdk();

    assert!(service.track(&[json!("user"), json!("purchase")]));
    assert!(service.track(&[
        json!("user"),
        json!("purchase"),
        json!(9.99),
        json!({ "currency": "EUR" }),
    ]));
    assert!(service.track(&[json!("k2"), json!("user"), json!("click"), json!(1)]));

    let main = sdk.main().tracked();
    assert_eq!(main.len(), 2);
    assert_eq!(main[0], ("user".to_string(), "purchase".to_string(), None, None));
    assert_eq!(main[1].2, Some(9.99));
    assert_eq!(
        main[1].3.as_ref().and_then(|p| p.get("currency")),
        Some(&json!("EUR"))
    );

    let k2 = sdk.mock_client("k2").tracked();
    assert_eq!(
        k2,
        vec![("user".to_string(), "click".to_string(), Some(1.0), None)]
    );

    // Keyed form with every argument.
    let _k1 = service.create_client(&SplitKey::from("k1"));
    assert!(service.track(&[
        json!("k1"),
        json!("user"),
        json!("purchase"),
        json!(42),
        json!({ "sku": "abc" }),
    ]));
    assert_eq!(
        sdk.mock_client("k1").tracked(),
        vec![(
            "user".to_string(),
            "purchase".to_string(),
            Some(42.0),
            json!({ "sku": "abc" }).as_object().cloned(),
        )]
    );
}

#[tokio::test]
#[traced_test]
async fn test_track_string_in_third_position_is_a_key() {
    let (factory, service) = initialized_service();

    // Read as key "user", traffic type "purchase", event type "not-a-number".
    assert!(!service.track(&[json!("user"), json!("purchase"), json!("not-a-number")]));
    assert!(factory.sdk().main().tracked().is_empty());
    assert!(logs_contain("client for key user should be initialized first"));
}

#[tokio::test]
#[traced_test]
async fn test_invalid_arguments() {
    let (factory, service) = initialized_service();

    assert_eq!(service.get_treatment(&[]), CONTROL);
    assert_eq!(service.get_treatment(&[json!(5)]), CONTROL);
    assert_eq!(service.get_treatment(&[json!("flag1"), json!(5)]), CONTROL);
    // Single flag methods do not take a list.
    assert_eq!(service.get_treatment(&[json!(["flag1", "flag2"])]), CONTROL);
    assert_eq!(
        service.get_treatment_with_config(&[json!(true)]),
        TreatmentWithConfig::control()
    );
    assert!(service
        .get_treatments_by_flag_set(&[json!(["front", "back"])])
        .is_empty());
    assert!(service.get_treatments(&[json!([1, 2])]).is_empty());
    assert!(!service.track(&[json!("user")]));
    assert!(!service.track(&[json!("user"), json!("purchase"), json!({ "a": 1 })]));

    assert!(factory.sdk().main().calls().is_empty());
    logs_assert(|lines: &[&str]| {
        match lines
            .iter()
            .filter(|line| line.contains("invalid arguments"))
            .count()
        {
            9 => Ok(()),
            n => Err(format!("expected one diagnostic per call, got {}", n)),
        }
    });
}

#[tokio::test]
async fn test_manager_passthrough() {
    let (_, service) = initialized_service();

    let splits = service.get_splits();
    assert_eq!(splits.len(), 1);
    assert_eq!(splits[0].name, "flag1");
    assert_eq!(
        service.get_split("flag1").map(|s| s.default_treatment),
        Some("off".to_string())
    );
    assert!(service.get_split("missing").is_none());
    assert_eq!(service.get_split_names(), vec!["flag1"]);
}

#[tokio::test]
async fn test_sdk_accessors() {
    let (factory, service) = initialized_service();
    let k2 = SplitKey::from("k2");

    assert!(service.sdk_client(None).is_some());
    assert!(service.sdk_client(Some(&k2)).is_none());
    let _ready = service.create_client(&k2);
    assert!(service.sdk_client(Some(&k2)).is_some());

    let sdk = service.sdk_factory().expect("should be initialized");
    sdk.client(Some(&k2)).get_treatment("flag1", None, None);
    assert_eq!(
        factory.sdk().mock_client("k2").calls(),
        vec!["get_treatment:flag1:false:false"]
    );
}
