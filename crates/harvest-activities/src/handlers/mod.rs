pub mod abc;
pub mod free_rewards;
pub mod poll;
pub mod quiz;
pub mod quiz_state;
pub mod search_on_bing;
pub mod this_or_that;
pub mod url_reward;
