mod data;
mod helpers;
mod log;
mod prefs;
mod profile;
mod safety;
mod summary;
mod weight;

pub(crate) use data::{cmd_insight_import, cmd_insight_show, cmd_reset};
pub(crate) use log::{
    FoodArgs, cmd_exercise_add, cmd_exercise_parse, cmd_exercise_remove, cmd_food_add,
    cmd_food_remove, cmd_note,
};
pub(crate) use prefs::{PrefsUpdate, cmd_prefs_set, cmd_prefs_show};
pub(crate) use profile::{ProfileArgs, cmd_plan, cmd_profile_set, cmd_profile_show};
pub(crate) use safety::{cmd_safety_check, cmd_safety_list};
pub(crate) use summary::{cmd_history, cmd_stats, cmd_summary};
pub(crate) use weight::{WeightArgs, cmd_weight_history, cmd_weight_log};
