mod headers;

pub use headers::{header_map, parse_headers};
