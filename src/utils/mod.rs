pub mod text;
#[cfg(test)]
pub mod test_utils;
pub mod url;
