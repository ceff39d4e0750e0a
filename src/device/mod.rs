mod ua_parser;

pub use ua_parser::parse_user_agent;
