mod activity;
mod helpers;
mod meal;
mod profile;
mod steps;
mod summary;
mod water;

pub(crate) use activity::{
    TrackWrite, cmd_track_delete, cmd_track_list, cmd_track_show, cmd_track_write,
    cmd_workout_delete, cmd_workout_list, cmd_workout_log, cmd_workout_show,
};
pub(crate) use meal::{cmd_meal_delete, cmd_meal_image, cmd_meal_list, cmd_meal_log};
pub(crate) use profile::{cmd_profile_photo, cmd_profile_set, cmd_profile_show};
pub(crate) use steps::{cmd_steps_reading, cmd_sync};
pub(crate) use summary::{cmd_range, cmd_summary};
pub(crate) use water::{
    cmd_water_goal_from_profile, cmd_water_goal_set, cmd_water_goal_show, cmd_water_history,
    cmd_water_log, cmd_water_today, cmd_water_undo,
};
