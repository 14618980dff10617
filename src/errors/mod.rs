pub mod publisher_error;
