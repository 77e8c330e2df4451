pub mod channel_list;
pub mod header;
pub mod help_overlay;
pub mod log_panel;
pub mod post_config_panel;
pub mod progress_panel;
