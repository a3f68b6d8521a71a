use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{RUBRIC_MAX, RUBRIC_MIN};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaxonomyError {
    #[error("rubric dimension '{dimension}' is mapped to both '{first}' and '{second}'")]
    DuplicateDimension {
        dimension: String,
        first: String,
        second: String,
    },
    #[error("skill category '{0}' is declared more than once")]
    DuplicateCategory(String),
    #[error("skill category '{0}' has no rubric dimensions")]
    EmptyCategory(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaxonomyPreset {
    #[default]
    General,
    Debate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillCategory {
    pub name: String,
    pub dimensions: Vec<String>,
}

impl SkillCategory {
    pub fn new(name: &str, dimensions: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            dimensions: dimensions.iter().map(|key| (*key).to_owned()).collect(),
        }
    }
}

/// Fixed registry from rubric dimension keys to skill categories. Built once
/// and only read afterwards.
#[derive(Debug, Clone)]
pub struct SkillTaxonomy {
    categories: Vec<SkillCategory>,
    index: HashMap<String, usize>,
}

impl SkillTaxonomy {
    pub fn new(categories: Vec<SkillCategory>) -> Result<Self, TaxonomyError> {
        let mut index = HashMap::new();
        let mut names: Vec<&str> = Vec::new();

        for (position, category) in categories.iter().enumerate() {
            if names.contains(&category.name.as_str()) {
                return Err(TaxonomyError::DuplicateCategory(category.name.clone()));
            }
            names.push(&category.name);

            if category.dimensions.is_empty() {
                return Err(TaxonomyError::EmptyCategory(category.name.clone()));
            }

            for dimension in &category.dimensions {
                if let Some(existing) = index.insert(dimension.clone(), position) {
                    return Err(TaxonomyError::DuplicateDimension {
                        dimension: dimension.clone(),
                        first: categories[existing].name.clone(),
                        second: category.name.clone(),
                    });
                }
            }
        }

        Ok(Self { categories, index })
    }

    pub fn preset(preset: TaxonomyPreset) -> Result<Self, TaxonomyError> {
        let categories = match preset {
            TaxonomyPreset::General => general_categories(),
            TaxonomyPreset::Debate => debate_categories(),
        };
        Self::new(categories)
    }

    pub fn categories(&self) -> &[SkillCategory] {
        &self.categories
    }

    pub fn category_for(&self, dimension: &str) -> Option<&SkillCategory> {
        self.index
            .get(dimension)
            .map(|position| &self.categories[*position])
    }

    /// Linear map of a rubric value onto 0-100.
    pub fn scale(&self, raw: f64) -> f64 {
        let min = f64::from(RUBRIC_MIN);
        let max = f64::from(RUBRIC_MAX);
        (raw - min) / (max - min) * 100.0
    }
}

fn general_categories() -> Vec<SkillCategory> {
    vec![
        SkillCategory::new(
            "Argumentation",
            &["rebuttal", "evidence", "reasoning", "clash"],
        ),
        SkillCategory::new(
            "Delivery",
            &["time_management", "vocal_variety", "eye_contact", "body_language"],
        ),
        SkillCategory::new(
            "Structure",
            &["organization", "signposting", "introduction", "conclusion"],
        ),
        SkillCategory::new("Engagement", &["poi_handling", "audience_awareness"]),
    ]
}

fn debate_categories() -> Vec<SkillCategory> {
    vec![
        SkillCategory::new(
            "Content",
            &["argument_quality", "evidence", "reasoning", "rebuttal"],
        ),
        SkillCategory::new(
            "Style",
            &["vocal_variety", "eye_contact", "body_language", "time_management"],
        ),
        SkillCategory::new(
            "Strategy",
            &["signposting", "prioritization", "clash", "poi_handling"],
        ),
    ]
}
