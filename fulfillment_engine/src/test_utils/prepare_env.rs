/// Loads `.env` (if present) and initialises logging for a test run. Safe to call repeatedly.
pub fn prepare_test_env() {
    let _ = dotenvy::dotenv();
    let _ = env_logger::try_init();
}
