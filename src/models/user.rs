pub const USER_COLLECTION: &str = "user";
