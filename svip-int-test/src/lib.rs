pub mod test_util;
pub mod users;
