
// Robustness
mod tests_errors;
