mod helpers;


// Robustness
mod tests_corruption;
