use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use slimify_core::calories::{calculate_bmr, calculate_daily_target, calculate_tdee};
use slimify_core::models::{ActivityLevel, NewProfile, Sex};
use slimify_core::service::TrackerService;

use super::helpers::{height_to_inches, inches_to_unit, json_error, lbs_to_unit, print_json, weight_to_lbs};

pub(crate) struct ProfileArgs {
    pub age: u32,
    pub weight: f64,
    pub height: f64,
    pub activity: ActivityLevel,
    pub sex: Sex,
    pub target_weight: f64,
    pub goal: f64,
}

/// Weights and heights are read in the user's preferred units.
pub(crate) async fn cmd_profile_set(
    service: &TrackerService,
    args: ProfileArgs,
    json: bool,
) -> Result<()> {
    let units = service.preferences().units;
    let profile = service
        .save_user_profile(NewProfile {
            age: args.age,
            weight: weight_to_lbs(args.weight, units.weight)?,
            height: height_to_inches(args.height, units.height)?,
            activity_level: args.activity,
            sex: args.sex,
            target_weight: weight_to_lbs(args.target_weight, units.weight)?,
            weekly_goal: args.goal,
        })
        .await?;

    if json {
        return print_json(&profile);
    }
    let target = service
        .today_log()
        .map_or_else(|| calculate_daily_target(&profile), |l| l.target_calories);
    println!("Profile saved. Today's target: {target} kcal");
    println!("Run `slimify plan` to see the week.");
    Ok(())
}

pub(crate) fn cmd_profile_show(service: &TrackerService, json: bool) -> Result<()> {
    let Some(profile) = service.profile() else {
        if json {
            println!("{}", json_error("No profile yet"));
            return Ok(());
        }
        bail!("No profile yet. Create one with `slimify profile set`");
    };
    if json {
        return print_json(&profile);
    }

    let units = service.preferences().units;
    let w = units.weight;
    println!("Age:            {}", profile.age);
    println!("Sex:            {}", profile.sex);
    println!("Weight:         {:.1} {w}", lbs_to_unit(profile.weight, w));
    println!(
        "Height:         {:.1} {}",
        inches_to_unit(profile.height, units.height),
        units.height
    );
    println!("Activity:       {}", profile.activity_level);
    println!("Target weight:  {:.1} {w}", lbs_to_unit(profile.target_weight, w));
    println!("Weekly goal:    {} lbs/week", profile.weekly_goal);
    println!();
    println!("BMR:            {} kcal", calculate_bmr(&profile));
    println!("TDEE:           {} kcal", calculate_tdee(&profile));
    println!("Daily target:   {} kcal", calculate_daily_target(&profile));
    Ok(())
}

pub(crate) async fn cmd_plan(service: &TrackerService, json: bool) -> Result<()> {
    let Some(plan) = service.current_weekly_plan().await? else {
        if json {
            println!("{}", json_error("No plan for this week"));
            return Ok(());
        }
        bail!("No plan for this week. Save a profile with `slimify profile set` first");
    };
    if json {
        return print_json(&plan);
    }

    #[derive(Tabled)]
    struct PlanRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Day")]
        day: String,
        #[tabled(rename = "Target")]
        target: i64,
        #[tabled(rename = "")]
        marker: &'static str,
    }

    let today = service.today();
    let rows: Vec<PlanRow> = plan
        .daily_targets
        .iter()
        .map(|(date, target)| PlanRow {
            date: date.format("%Y-%m-%d").to_string(),
            day: date.format("%a").to_string(),
            target: *target,
            marker: if *date == today { "<- today" } else { "" },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("Week of {}", plan.week_start_date.format("%Y-%m-%d"));
    println!("{table}");
    println!(
        "Average {} kcal, weekly deficit {} kcal, projected loss {:.1} lbs",
        plan.average_target, plan.total_deficit, plan.projected_loss
    );
    Ok(())
}
