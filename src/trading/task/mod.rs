pub mod bot_cycle;
