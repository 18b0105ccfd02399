pub mod grn_header;
pub mod grn_line;
pub mod product;
pub mod stock_level;
pub mod stock_movement;
