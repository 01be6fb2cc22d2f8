use std::time::Duration;

use app_config::AppConfig;

#[test]
fn test_load_default_config() {
    let cfg = AppConfig::load().unwrap();

    assert_eq!(cfg.payment_link_expiry, Duration::from_secs(20 * 60));
    assert!(cfg.payment_link_expiry >= Duration::from_secs(15 * 60));
    assert_eq!(cfg.cod_fee_minor, 15000);
    assert_eq!(cfg.default_country_code, "91");
    assert!(cfg.database_dsn().contains("dbname="));
}
