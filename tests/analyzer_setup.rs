use signal_fill::analyzer::OpenRouterAnalyzer;
use signal_fill::config::Config;

#[test]
fn construction_requires_the_api_key() {
    let mut cfg = Config::default();
    // An env var nothing in the environment defines.
    cfg.api.api_key_env = "SIGNAL_FILL_TEST_UNSET_TOKEN".into();
    let err = OpenRouterAnalyzer::new(&cfg).unwrap_err();
    assert!(err.to_string().contains("SIGNAL_FILL_TEST_UNSET_TOKEN"));
}
