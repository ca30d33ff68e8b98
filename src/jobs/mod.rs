pub mod user_created_listener;
