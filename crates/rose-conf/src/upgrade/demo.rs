//! upgrade chains of the demo metadata categories
use super::{MacroUpgrade, SettingOptions, UpgradeError, UpgradeMacro};
use crate::config::{ConfigNode, LoadError};
use crate::macros::MacroReport;

pub const DEMO_UPGRADE: &str = "rose-demo-upgrade";
pub const DEMO_UPGRADE_GARDEN: &str = "rose-demo-upgrade-garden";

/// Upgrade macros shipped for the metadata `category`
pub fn builtin_macros(category: &str) -> Option<Vec<Box<dyn UpgradeMacro>>> {
    match category {
        DEMO_UPGRADE => Some(vec![
            Box::new(Upgrade272to273),
            Box::new(Upgrade273to281),
            Box::new(Upgrade281to291),
            Box::new(Upgrade291to292),
        ]),
        DEMO_UPGRADE_GARDEN => Some(vec![
            Box::new(UpgradeGarden01),
            Box::new(UpgradeGarden02),
            Box::new(UpgradeGarden03),
            Box::new(UpgradeGarden041),
            Box::new(UpgradeGarden09),
        ]),
        _ => None,
    }
}

/// Add and remove the settings of compiled-in `rose-macro-add.conf` and `rose-macro-remove.conf` texts
fn act_from_texts(config: &mut ConfigNode, add: &str, remove: &str, downgrade: bool) -> Result<Vec<MacroReport>, UpgradeError> {
    let add_config: ConfigNode = add.parse().map_err(LoadError::from)?;
    let remove_config: ConfigNode = remove.parse().map_err(LoadError::from)?;
    let mut changes = MacroUpgrade::default();
    changes.act_from_configs(config, &add_config, &remove_config, downgrade)?;
    Ok(changes.into_reports())
}

/// Upgrade from 27.2 to 27.3
#[derive(Debug, Default)]
pub struct Upgrade272to273;

impl UpgradeMacro for Upgrade272to273 {
    fn before_tag(&self) -> &str {
        "27.2"
    }

    fn after_tag(&self) -> &str {
        "27.3"
    }

    fn upgrade(&self, config: &mut ConfigNode, _meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError> {
        let mut changes = MacroUpgrade::default();
        let none = SettingOptions::default();
        changes.add_setting(config, &["env", "C"], Some("0"), &none)?;
        changes.add_setting(config, &["env", "D"], Some("1"), &none)?;
        changes.remove_setting(config, &["env", "A"], None);
        changes.remove_setting(config, &["env", "B"], None);
        Ok(changes.into_reports())
    }

    fn downgrade(&self, config: &mut ConfigNode, _meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError> {
        let mut changes = MacroUpgrade::default();
        let none = SettingOptions::default();
        changes.remove_setting(config, &["env", "C"], None);
        changes.remove_setting(config, &["env", "D"], None);
        changes.add_setting(config, &["env", "A"], Some("0"), &none)?;
        changes.add_setting(config, &["env", "B"], Some("1"), &none)?;
        Ok(changes.into_reports())
    }
}

/// Upgrade from 27.3 to 28.1
#[derive(Debug, Default)]
pub struct Upgrade273to281;

impl UpgradeMacro for Upgrade273to281 {
    fn before_tag(&self) -> &str {
        "27.3"
    }

    fn after_tag(&self) -> &str {
        "28.1"
    }

    fn upgrade(&self, config: &mut ConfigNode, _meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError> {
        let mut changes = MacroUpgrade::default();
        changes.remove_setting(config, &["namelist:test_nl", "X"], Some("Remove for #2020"));
        Ok(changes.into_reports())
    }

    fn downgrade(&self, config: &mut ConfigNode, _meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError> {
        let mut changes = MacroUpgrade::default();
        changes.add_setting(config, &["namelist:test_nl", "X"], Some("0"), &SettingOptions::default())?;
        Ok(changes.into_reports())
    }
}

/// Upgrade from 28.1 to 29.1
#[derive(Debug, Default)]
pub struct Upgrade281to291;

impl UpgradeMacro for Upgrade281to291 {
    fn before_tag(&self) -> &str {
        "28.1"
    }

    fn after_tag(&self) -> &str {
        "29.1"
    }

    fn upgrade(&self, config: &mut ConfigNode, _meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError> {
        let mut changes = MacroUpgrade::default();
        changes.remove_setting(config, &["namelist:test_nl", "C"], Some("Remove for #1668"));
        Ok(changes.into_reports())
    }

    fn downgrade(&self, config: &mut ConfigNode, _meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError> {
        let mut changes = MacroUpgrade::default();
        changes.add_setting(config, &["namelist:test_nl", "C"], Some("0"), &SettingOptions::default())?;
        Ok(changes.into_reports())
    }
}

/// Upgrade from 29.1 to 29.2, driven by resource files
#[derive(Debug, Default)]
pub struct Upgrade291to292;

const ADD_29_1: &str = include_str!("../../etc/rose-demo-upgrade/29.1/rose-macro-add.conf");
const REMOVE_29_1: &str = include_str!("../../etc/rose-demo-upgrade/29.1/rose-macro-remove.conf");

impl UpgradeMacro for Upgrade291to292 {
    fn before_tag(&self) -> &str {
        "29.1"
    }

    fn after_tag(&self) -> &str {
        "29.2"
    }

    fn upgrade(&self, config: &mut ConfigNode, _meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError> {
        act_from_texts(config, ADD_29_1, REMOVE_29_1, false)
    }

    fn downgrade(&self, config: &mut ConfigNode, _meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError> {
        act_from_texts(config, ADD_29_1, REMOVE_29_1, true)
    }
}

const FEATURES: &str = "namelist:features";

/// 'We want... a shrubbery!'
#[derive(Debug, Default)]
pub struct UpgradeGarden01;

impl UpgradeMacro for UpgradeGarden01 {
    fn before_tag(&self) -> &str {
        "garden0.1"
    }

    fn after_tag(&self) -> &str {
        "garden0.2"
    }

    fn description(&self) -> &str {
        "'We want... a shrubbery!'"
    }

    fn upgrade(&self, config: &mut ConfigNode, _meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError> {
        let mut changes = MacroUpgrade::default();
        changes.add_setting(config, &[FEATURES, "shrubberies"], Some("1"), &SettingOptions::default())?;
        Ok(changes.into_reports())
    }

    fn downgrade(&self, config: &mut ConfigNode, _meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError> {
        let mut changes = MacroUpgrade::default();
        changes.remove_setting(config, &[FEATURES, "shrubberies"], None);
        Ok(changes.into_reports())
    }
}

/// '...there is one small problem...'
#[derive(Debug, Default)]
pub struct UpgradeGarden02;

impl UpgradeMacro for UpgradeGarden02 {
    fn before_tag(&self) -> &str {
        "garden0.2"
    }

    fn after_tag(&self) -> &str {
        "garden0.3"
    }

    fn description(&self) -> &str {
        "'...there is one small problem...'"
    }

    fn upgrade(&self, config: &mut ConfigNode, _meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError> {
        let mut changes = MacroUpgrade::default();
        let laurels = Some("'particularly nice'");
        changes.add_setting(config, &[FEATURES, "shrubbery_laurels"], laurels, &SettingOptions::default())?;
        let shrub_num = changes.get_setting_value(config, &[FEATURES, "shrubberies"], false);
        if let Some(shrub_num @ ("0" | "1")) = shrub_num {
            let report = MacroReport::new(
                FEATURES,
                Some("shrubberies"),
                Some(shrub_num),
                "More than one shrubbery is desirable",
            );
            changes.add_report(report.warning());
        }
        Ok(changes.into_reports())
    }

    fn downgrade(&self, config: &mut ConfigNode, _meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError> {
        let mut changes = MacroUpgrade::default();
        changes.remove_setting(config, &[FEATURES, "shrubbery_laurels"], None);
        Ok(changes.into_reports())
    }
}

/// 'You must find... another shrubbery!'
#[derive(Debug, Default)]
pub struct UpgradeGarden03;

fn shrub_num(changes: &MacroUpgrade, config: &ConfigNode) -> Option<f64> {
    changes
        .get_setting_value(config, &[FEATURES, "shrubberies"], false)?
        .trim()
        .parse()
        .ok()
}

impl UpgradeMacro for UpgradeGarden03 {
    fn before_tag(&self) -> &str {
        "garden0.3"
    }

    fn after_tag(&self) -> &str {
        "garden0.4"
    }

    fn description(&self) -> &str {
        "'You must find... another shrubbery!'"
    }

    fn upgrade(&self, config: &mut ConfigNode, _meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError> {
        let mut changes = MacroUpgrade::default();
        if shrub_num(&changes, config) == Some(1.0) {
            let info = SettingOptions::info("Fetched another shrubbery");
            changes.change_setting_value(config, &[FEATURES, "shrubberies"], "2", &info)?;
        }
        Ok(changes.into_reports())
    }

    fn downgrade(&self, config: &mut ConfigNode, _meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError> {
        let mut changes = MacroUpgrade::default();
        if shrub_num(&changes, config) == Some(2.0) {
            changes.change_setting_value(config, &[FEATURES, "shrubberies"], "1", &SettingOptions::default())?;
        }
        Ok(changes.into_reports())
    }
}

/// '...the two-level effect with a little path running down the middle'
#[derive(Debug, Default)]
pub struct UpgradeGarden041;

const ADD_GARDEN_0_4: &str = include_str!("../../etc/rose-demo-upgrade-garden/garden0.4/rose-macro-add.conf");
const REMOVE_GARDEN_0_4: &str = include_str!("../../etc/rose-demo-upgrade-garden/garden0.4/rose-macro-remove.conf");

impl UpgradeMacro for UpgradeGarden041 {
    fn before_tag(&self) -> &str {
        "garden0.4"
    }

    fn after_tag(&self) -> &str {
        "garden0.4.1"
    }

    fn description(&self) -> &str {
        "'...the two-level effect with a little path running down the middle'"
    }

    fn upgrade(&self, config: &mut ConfigNode, _meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError> {
        act_from_texts(config, ADD_GARDEN_0_4, REMOVE_GARDEN_0_4, false)
    }

    fn downgrade(&self, config: &mut ConfigNode, _meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError> {
        act_from_texts(config, ADD_GARDEN_0_4, REMOVE_GARDEN_0_4, true)
    }
}

/// 'cut down the mightiest tree in the forest... with... a herring!'
#[derive(Debug, Default)]
pub struct UpgradeGarden09;

impl UpgradeMacro for UpgradeGarden09 {
    fn before_tag(&self) -> &str {
        "garden0.4.1"
    }

    fn after_tag(&self) -> &str {
        "garden0.9"
    }

    fn description(&self) -> &str {
        "'cut down the mightiest tree in the forest... with... a herring!'"
    }

    fn upgrade(&self, config: &mut ConfigNode, _meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError> {
        let mut changes = MacroUpgrade::default();
        let none = SettingOptions::default();
        changes.add_setting(config, &["namelist:trees", "mighty_tree"], Some("1"), &none)?;
        changes.add_setting(config, &["env", "AXE"], Some("herring"), &none)?;
        Ok(changes.into_reports())
    }

    fn downgrade(&self, config: &mut ConfigNode, _meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError> {
        let mut changes = MacroUpgrade::default();
        changes.remove_setting(config, &["env", "AXE"], None);
        changes.remove_setting(config, &["namelist:trees"], None);
        Ok(changes.into_reports())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::upgrade::{version_listing, MacroUpgradeManager};
    use pretty_assertions::assert_eq;

    fn manager(config: &ConfigNode, category: &str, downgrade: bool) -> MacroUpgradeManager {
        MacroUpgradeManager::new(config, builtin_macros(category).unwrap(), downgrade).unwrap()
    }

    #[test]
    fn upgrade_then_downgrade_restores_settings() {
        let original: ConfigNode = "meta=rose-demo-upgrade/27.2\n\n[env]\nA=0\nB=1\n".parse().unwrap();
        let meta = ConfigNode::new();
        let mut config = original.clone();

        let mut upgrade = manager(&config, DEMO_UPGRADE, false);
        upgrade.set_new_tag("27.3").unwrap();
        let reports = upgrade.transform(&mut config, &meta).unwrap();
        let infos: Vec<(String, &str)> = reports.iter().map(|r| (r.id(), r.info.as_str())).collect();
        assert_eq!(
            infos,
            vec![
                ("env=C".to_string(), "Added with value '0'"),
                ("env=D".to_string(), "Added with value '1'"),
                ("env=A".to_string(), "Removed"),
                ("env=B".to_string(), "Removed"),
                ("=meta".to_string(), "Upgraded from 27.2 to 27.3"),
            ]
        );
        assert_eq!(config.dump(), "meta=rose-demo-upgrade/27.3\n\n[env]\nC=0\nD=1\n");

        let mut downgrade = manager(&config, DEMO_UPGRADE, true);
        downgrade.set_new_tag("27.2").unwrap();
        downgrade.transform(&mut config, &meta).unwrap();
        assert_eq!(config.dump(), original.dump());
    }

    #[test]
    fn version_chain() {
        let config: ConfigNode = "meta=rose-demo-upgrade/27.3\n".parse().unwrap();
        let mut upgrade = manager(&config, DEMO_UPGRADE, false);
        assert_eq!(upgrade.get_tags(false), vec!["28.1", "29.1", "29.2"]);
        assert_eq!(upgrade.get_new_tag(false), Some("29.2"));
        assert_eq!(
            version_listing(&upgrade, false),
            vec!["= 27.3", "  28.1", "  29.1", "* 29.2"]
        );

        assert!(matches!(upgrade.set_new_tag("27.3"), Err(UpgradeError::SameVersion(_))));
        assert!(matches!(upgrade.set_new_tag("27.2"), Err(UpgradeError::InvalidVersion(_))));
        upgrade.set_new_tag("29.1").unwrap();
        assert_eq!(upgrade.name(), "Upgrade_27.3-29.1");
        let tags: Vec<&str> = upgrade.get_macros().iter().map(|m| m.after_tag()).collect();
        assert_eq!(tags, vec!["28.1", "29.1"]);

        let downgrade = manager(&config, DEMO_UPGRADE, true);
        assert_eq!(downgrade.get_tags(false), vec!["27.2"]);
        assert_eq!(version_listing(&downgrade, false), vec!["* 27.2", "= 27.3"]);
    }

    #[test]
    fn resource_files() {
        let mut config: ConfigNode = "meta=rose-demo-upgrade/29.1\n\n[namelist:test_nl]\nY=2\n".parse().unwrap();
        let mut upgrade = manager(&config, DEMO_UPGRADE, false);
        upgrade.set_new_tag("29.2").unwrap();
        upgrade.transform(&mut config, &ConfigNode::new()).unwrap();
        assert_eq!(
            config.dump(),
            "meta=rose-demo-upgrade/29.2\n\n[namelist:test_nl]\n#Added for #2112\nZ=1\n"
        );
    }

    #[test]
    fn garden() {
        let mut config: ConfigNode = "meta=rose-demo-upgrade-garden/garden0.1\n\n[namelist:features]\nrose_bushes=2\n"
            .parse()
            .unwrap();
        let meta = ConfigNode::new();
        let mut upgrade = manager(&config, DEMO_UPGRADE_GARDEN, false);
        upgrade.set_new_tag("garden0.9").unwrap();
        let reports = upgrade.transform(&mut config, &meta).unwrap();

        let warnings: Vec<&str> = reports.iter().filter(|r| r.is_warning).map(|r| r.info.as_str()).collect();
        assert_eq!(warnings, vec!["More than one shrubbery is desirable"]);
        assert_eq!(config.get_value(&[FEATURES, "shrubberies"]), Some("2"));
        assert_eq!(config.get_value(&[FEATURES, "shrubbery_levels"]), Some("2"));
        assert_eq!(config.get_value(&["env", "AXE"]), Some("herring"));

        let mut downgrade = manager(&config, DEMO_UPGRADE_GARDEN, true);
        downgrade.set_new_tag("garden0.1").unwrap();
        downgrade.transform(&mut config, &meta).unwrap();
        assert_eq!(
            config.dump(),
            "meta=rose-demo-upgrade-garden/garden0.1\n\n[env]\n\n[namelist:features]\nrose_bushes=2\nshrubbery_flat=.true.\n"
        );
    }
}
