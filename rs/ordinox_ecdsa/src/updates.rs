pub mod create_or_sign_message;
pub mod setup;

#[cfg(test)]
mod tests;
