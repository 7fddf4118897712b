use anyhow::Result;

use slimify_core::models::{HeightUnit, Theme, UserPreferences, WeightUnit};
use slimify_core::service::TrackerService;

use super::helpers::print_json;

/// Fields left as `None` keep their stored value. An empty reminder string
/// clears that reminder.
#[derive(Default)]
pub(crate) struct PrefsUpdate {
    pub theme: Option<Theme>,
    pub notifications: Option<bool>,
    pub weight_unit: Option<WeightUnit>,
    pub height_unit: Option<HeightUnit>,
    pub breakfast: Option<String>,
    pub lunch: Option<String>,
    pub dinner: Option<String>,
    pub weigh: Option<String>,
}

fn set_reminder(slot: &mut Option<String>, value: Option<String>) {
    if let Some(v) = value {
        *slot = Some(v).filter(|v| !v.trim().is_empty());
    }
}

fn apply(mut prefs: UserPreferences, update: PrefsUpdate) -> UserPreferences {
    if let Some(theme) = update.theme {
        prefs.theme = theme;
    }
    if let Some(on) = update.notifications {
        prefs.enable_notifications = on;
    }
    if let Some(unit) = update.weight_unit {
        prefs.units.weight = unit;
    }
    if let Some(unit) = update.height_unit {
        prefs.units.height = unit;
    }
    let times = &mut prefs.reminder_times;
    set_reminder(&mut times.breakfast, update.breakfast);
    set_reminder(&mut times.lunch, update.lunch);
    set_reminder(&mut times.dinner, update.dinner);
    set_reminder(&mut times.weigh, update.weigh);
    prefs
}

fn print_prefs(prefs: &UserPreferences) {
    let time = |t: &Option<String>| t.clone().unwrap_or_else(|| "-".to_string());
    let times = &prefs.reminder_times;
    println!("Theme:          {}", prefs.theme);
    println!(
        "Notifications:  {}",
        if prefs.enable_notifications { "on" } else { "off" }
    );
    println!("Weight unit:    {}", prefs.units.weight);
    println!("Height unit:    {}", prefs.units.height);
    println!("Reminders:");
    println!("  breakfast     {}", time(&times.breakfast));
    println!("  lunch         {}", time(&times.lunch));
    println!("  dinner        {}", time(&times.dinner));
    println!("  weigh-in      {}", time(&times.weigh));
}

pub(crate) fn cmd_prefs_show(service: &TrackerService, json: bool) -> Result<()> {
    let prefs = service.preferences();
    if json {
        return print_json(&prefs);
    }
    print_prefs(&prefs);
    Ok(())
}

pub(crate) async fn cmd_prefs_set(
    service: &TrackerService,
    update: PrefsUpdate,
    json: bool,
) -> Result<()> {
    let prefs = apply(service.preferences(), update);
    service.save_preferences(prefs.clone()).await?;

    if json {
        return print_json(&prefs);
    }
    println!("Preferences saved.\n");
    print_prefs(&prefs);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_keeps_unset_fields() {
        let base = UserPreferences::default();
        let updated = apply(
            base.clone(),
            PrefsUpdate {
                weight_unit: Some(WeightUnit::Kg),
                lunch: Some("12:30".to_string()),
                ..PrefsUpdate::default()
            },
        );
        assert_eq!(updated.units.weight, WeightUnit::Kg);
        assert_eq!(updated.units.height, base.units.height);
        assert_eq!(updated.theme, Theme::System);
        assert!(updated.enable_notifications);
        assert_eq!(updated.reminder_times.lunch.as_deref(), Some("12:30"));
        assert!(updated.reminder_times.dinner.is_none());
    }

    #[test]
    fn test_apply_empty_reminder_clears() {
        let mut base = UserPreferences::default();
        base.reminder_times.weigh = Some("07:00".to_string());
        let updated = apply(
            base,
            PrefsUpdate {
                weigh: Some(String::new()),
                notifications: Some(false),
                ..PrefsUpdate::default()
            },
        );
        assert!(updated.reminder_times.weigh.is_none());
        assert!(!updated.enable_notifications);
    }

    #[tokio::test]
    async fn test_prefs_set_rejects_bad_time() {
        let service = TrackerService::in_memory();
        let result = cmd_prefs_set(
            &service,
            PrefsUpdate {
                breakfast: Some("7am".to_string()),
                ..PrefsUpdate::default()
            },
            true,
        )
        .await;
        assert!(result.is_err());
        assert!(service.preferences().reminder_times.breakfast.is_none());
    }
}
