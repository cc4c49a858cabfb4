use std::collections::HashMap;

use crate::{
    config::LocalhostFeature,
    models::{SplitView, CONTROL},
    sdk::SplitManager,
};

use super::client::Features;

const LOCALHOST_TRAFFIC_TYPE: &str = "localhost";

pub struct LocalhostManager {
    features: Features,
}

impl LocalhostManager {
    pub(crate) fn new(features: Features) -> Self {
        Self { features }
    }
}

fn to_view(name: &str, feature: &LocalhostFeature) -> SplitView {
    let mut configs = HashMap::new();
    configs.insert(
        feature.treatment().to_string(),
        feature.config().map(str::to_string),
    );
    SplitView {
        name: name.to_string(),
        traffic_type: LOCALHOST_TRAFFIC_TYPE.to_string(),
        killed: false,
        treatments: vec![feature.treatment().to_string()],
        change_number: 0,
        configs,
        sets: feature.sets().to_vec(),
        default_treatment: CONTROL.to_string(),
        impressions_disabled: false,
    }
}

impl SplitManager for LocalhostManager {
    fn splits(&self) -> Vec<SplitView> {
        let features = self
            .features
            .read()
            .expect("should always be able to acquire read lock");
        let mut views: Vec<SplitView> = features
            .iter()
            .map(|(name, feature)| to_view(name, feature))
            .collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        views
    }

    fn split(&self, feature_flag_name: &str) -> Option<SplitView> {
        self.features
            .read()
            .expect("should always be able to acquire read lock")
            .get(feature_flag_name)
            .map(|feature| to_view(feature_flag_name, feature))
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .features
            .read()
            .expect("should always be able to acquire read lock")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
