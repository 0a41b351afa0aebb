use config::FileFormat;
use refgraph::builder::EmptyDomainPolicy;
use refgraph::error::RefgraphError;
use refgraph::features::Model;
use refgraph::settings::InferenceSettings;

#[test]
fn defaults() {
    let settings = InferenceSettings::default();
    assert_eq!(settings.epsilon, 0.01);
    assert_eq!(settings.max_iterations, 1000);
    assert_eq!(settings.beam_size, 100);
    assert_eq!(settings.max_limit, 100);
    assert!(!settings.sloppy);
    assert_eq!(settings.empty_domain, EmptyDomainPolicy::KeepPlaceholder);
    assert!(settings.loopy_bp().max_time().is_none());
}

#[test]
fn partial_files_keep_defaults() {
    let text = "epsilon = 0.1\nmax_time_ms = 250\nempty_domain = \"exclude\"\n";
    let settings = InferenceSettings::from_str(text, FileFormat::Toml).expect("settings");
    assert_eq!(settings.epsilon, 0.1);
    assert_eq!(settings.max_iterations, 1000);
    assert_eq!(settings.empty_domain, EmptyDomainPolicy::Exclude);
    let bp = settings.loopy_bp();
    assert_eq!(bp.epsilon(), 0.1);
    assert_eq!(bp.max_time(), Some(std::time::Duration::from_millis(250)));

    let json = InferenceSettings::from_str("{\"beam_size\": 5, \"sloppy\": true}", FileFormat::Json).expect("settings");
    assert_eq!(json.beam_size, 5);
    assert!(json.sloppy);
}

#[test]
fn invalid_values_are_config_errors() {
    let err = InferenceSettings::from_str("max_iterations = \"many\"\n", FileFormat::Toml).unwrap_err();
    assert!(matches!(err, RefgraphError::Config(_)));
}

#[test]
fn model_round_trips_through_json() {
    let mut model = Model::new();
    model.set(&["RELPREF", "banana", "poss", "person"], 1.1);
    let restored = Model::from_json(&model.to_json().expect("json")).expect("model");
    assert_eq!(restored.weight(&["RELPREF", "banana", "poss", "person"]), 1.1);
    assert_eq!(restored.weight(&["RELPREF"]), 0.0);
    assert!(matches!(Model::from_json("not json"), Err(RefgraphError::Serialization(_))));
}
