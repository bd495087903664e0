mod day;
mod food;
mod helpers;
mod target;
mod workout;

pub(crate) use day::{cmd_day, cmd_history, cmd_pin, cmd_recalc, cmd_unpin};
pub(crate) use food::{
    FoodArgs, FoodUpdateArgs, cmd_food_add, cmd_food_delete, cmd_food_list, cmd_food_update,
};
pub(crate) use target::{TargetArgs, cmd_target_daily, cmd_target_set, cmd_target_show};
pub(crate) use workout::{
    WorkoutArgs, WorkoutUpdateArgs, cmd_workout_add, cmd_workout_delete, cmd_workout_list,
    cmd_workout_update,
};
