use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// The fixed set of article categories. Serialized as its lowercase id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Tech,
    Health,
    Business,
    Science,
    Entertainment,
    Travel,
    Food,
    Sports,
    Politics,
}

#[derive(Debug, Serialize)]
pub struct CategoryInfo {
    pub id: Category,
    pub name: &'static str,
    pub description: &'static str,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Tech,
        Category::Health,
        Category::Business,
        Category::Science,
        Category::Entertainment,
        Category::Travel,
        Category::Food,
        Category::Sports,
        Category::Politics,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Category::Tech => "tech",
            Category::Health => "health",
            Category::Business => "business",
            Category::Science => "science",
            Category::Entertainment => "entertainment",
            Category::Travel => "travel",
            Category::Food => "food",
            Category::Sports => "sports",
            Category::Politics => "politics",
        }
    }

    pub fn info(self) -> CategoryInfo {
        let (name, description) = match self {
            Category::Tech => ("Technology", "Latest in gadgets, apps, and digital trends"),
            Category::Health => ("Health & Wellness", "Tips for healthy living and wellbeing"),
            Category::Business => (
                "Business",
                "Market updates, entrepreneurship, and career advice",
            ),
            Category::Science => ("Science", "Discoveries, research, and innovation"),
            Category::Entertainment => (
                "Entertainment",
                "Movies, music, celebrities, and culture",
            ),
            Category::Travel => ("Travel", "Destinations, travel tips, and experiences"),
            Category::Food => (
                "Food & Cooking",
                "Recipes, restaurant reviews, and culinary trends",
            ),
            Category::Sports => ("Sports", "Games, athletes, and sporting events"),
            Category::Politics => ("Politics", "Policy updates, elections, and global affairs"),
        };
        CategoryInfo {
            id: self,
            name,
            description,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.id() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
