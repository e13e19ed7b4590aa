pub mod formatter;

pub use formatter::{
    format_breakdown, format_json, format_number, format_total, should_use_colors,
};
