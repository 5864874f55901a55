pub mod helpers;
mod tests_errors;
