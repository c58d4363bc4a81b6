pub mod helpers;
mod tests_scenarios;
