use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::migration::SCHEMA_VERSION;

/// The dashboard document: every card and link the new-tab page renders
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardData {
    pub version: String,
    /// Epoch milliseconds of the last save
    pub last_modified: i64,
    /// Device identity of the last writer (provenance only, never merged on)
    pub last_modified_by: String,
    pub cards: Vec<Card>,
}

impl Default for DashboardData {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            last_modified: 0,
            last_modified_by: String::new(),
            cards: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Card {
    pub id: String,
    pub title: String,
    /// Semantic color token, e.g. "blue-500"
    pub color: String,
    /// Zero-based dense rank among sibling cards
    pub order: i64,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Link {
    pub id: String,
    pub title: String,
    pub url: String,
    /// Symbolic icon name, resolved by the rendering layer
    pub icon: String,
    pub color: String,
    pub filled: bool,
    pub order: i64,
    /// Always present after migration, possibly empty
    pub sub_links: Vec<SubLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SubLink {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
}

/// Dashboard preferences, one document shared by theme and layout code
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardSettings {
    pub version: String,
    pub uniform_card_height: bool,
    pub theme: String,
    /// Set by the theme picker; absent until the user picks one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_theme: Option<String>,
    pub grid_columns: String,
    pub card_width: String,
    pub container_margin: String,
    pub icon_stroke_width: f64,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            uniform_card_height: false,
            theme: "light".to_string(),
            selected_theme: None,
            grid_columns: "auto".to_string(),
            card_width: "sm".to_string(),
            container_margin: "medium".to_string(),
            icon_stroke_width: 1.0,
        }
    }
}

/// The layout-only view over [`DashboardSettings`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSettings {
    pub card_width: String,
    pub container_margin: String,
}

/// Partial layout update; `None` fields are left as they are
#[derive(Debug, Clone, Default)]
pub struct LayoutUpdate {
    pub card_width: Option<String>,
    pub container_margin: Option<String>,
}

impl DashboardData {
    /// The starter document synthesized when neither area holds data
    pub fn starter(device_id: &str) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            last_modified: Utc::now().timestamp_millis(),
            last_modified_by: device_id.to_string(),
            cards: vec![
                Card {
                    id: "google-workspace".into(),
                    title: "Google Workspace".into(),
                    color: "blue-500".into(),
                    order: 0,
                    links: vec![
                        Link {
                            id: "gmail".into(),
                            title: "Gmail".into(),
                            url: "https://mail.google.com".into(),
                            icon: "mail".into(),
                            color: "red-500".into(),
                            filled: false,
                            order: 0,
                            sub_links: vec![
                                SubLink {
                                    id: "gmail-sub1".into(),
                                    title: "Compose New Email".into(),
                                    url: "https://mail.google.com/mail/u/0/#compose".into(),
                                    starred: Some(true),
                                },
                                SubLink {
                                    id: "gmail-sub2".into(),
                                    title: "Sent Items".into(),
                                    url: "https://mail.google.com/mail/u/0/#sent".into(),
                                    starred: Some(false),
                                },
                            ],
                        },
                        Link {
                            id: "drive".into(),
                            title: "Google Drive".into(),
                            url: "https://drive.google.com".into(),
                            icon: "folder".into(),
                            color: "yellow-500".into(),
                            filled: false,
                            order: 1,
                            sub_links: vec![
                                SubLink {
                                    id: "drive-sub1".into(),
                                    title: "My Drive".into(),
                                    url: "https://drive.google.com/drive/my-drive".into(),
                                    starred: Some(true),
                                },
                                SubLink {
                                    id: "drive-sub2".into(),
                                    title: "Shared with Me".into(),
                                    url: "https://drive.google.com/drive/shared-with-me".into(),
                                    starred: Some(false),
                                },
                                SubLink {
                                    id: "drive-sub3".into(),
                                    title: "Recent".into(),
                                    url: "https://drive.google.com/drive/recent".into(),
                                    starred: Some(false),
                                },
                            ],
                        },
                    ],
                },
                Card {
                    id: "ai-tools".into(),
                    title: "AI Tools".into(),
                    color: "purple-500".into(),
                    order: 1,
                    links: vec![
                        Link {
                            id: "chatgpt".into(),
                            title: "ChatGPT".into(),
                            url: "https://chat.openai.com".into(),
                            icon: "cpu-chip".into(),
                            color: "green-500".into(),
                            filled: false,
                            order: 0,
                            sub_links: Vec::new(),
                        },
                        Link {
                            id: "claude".into(),
                            title: "Claude".into(),
                            url: "https://claude.ai".into(),
                            icon: "brain".into(),
                            color: "orange-500".into(),
                            filled: false,
                            order: 1,
                            sub_links: Vec::new(),
                        },
                    ],
                },
            ],
        }
    }

    /// Cards in display order
    pub fn cards_sorted(&self) -> Vec<&Card> {
        let mut cards: Vec<&Card> = self.cards.iter().collect();
        cards.sort_by_key(|c| c.order);
        cards
    }

    pub fn card(&self, id: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.id == id)
    }

    pub fn card_mut(&mut self, id: &str) -> Option<&mut Card> {
        self.cards.iter_mut().find(|c| c.id == id)
    }

    /// Append a card at the end of the display order
    pub fn push_card(&mut self, mut card: Card) {
        card.order = self.cards.len() as i64;
        self.cards.push(card);
    }

    /// Remove a card and close the order gap it leaves
    pub fn remove_card(&mut self, id: &str) -> bool {
        let before = self.cards.len();
        self.cards.retain(|c| c.id != id);
        if self.cards.len() == before {
            return false;
        }
        self.reassign_card_orders();
        true
    }

    /// Apply a full new display order given card ids front-to-back
    pub fn reorder_cards(&mut self, ids: &[&str]) {
        for card in &mut self.cards {
            if let Some(pos) = ids.iter().position(|id| *id == card.id) {
                card.order = pos as i64;
            }
        }
        self.reassign_card_orders();
    }

    /// Move a link to the end of another card, re-ranking both cards
    pub fn move_link(&mut self, from_card: &str, to_card: &str, link_id: &str) -> bool {
        if self.card(to_card).is_none() {
            return false;
        }
        let link = match self.card_mut(from_card) {
            Some(card) => {
                let pos = match card.links.iter().position(|l| l.id == link_id) {
                    Some(pos) => pos,
                    None => return false,
                };
                let link = card.links.remove(pos);
                card.reassign_link_orders();
                link
            }
            None => return false,
        };
        // Destination existence checked above
        if let Some(card) = self.card_mut(to_card) {
            card.push_link(link);
        }
        true
    }

    fn reassign_card_orders(&mut self) {
        self.cards.sort_by_key(|c| c.order);
        for (idx, card) in self.cards.iter_mut().enumerate() {
            card.order = idx as i64;
        }
    }
}

impl Card {
    /// Links in display order
    pub fn links_sorted(&self) -> Vec<&Link> {
        let mut links: Vec<&Link> = self.links.iter().collect();
        links.sort_by_key(|l| l.order);
        links
    }

    /// Append a link at the end of the display order
    pub fn push_link(&mut self, mut link: Link) {
        link.order = self.links.len() as i64;
        self.links.push(link);
    }

    /// Remove a link and close the order gap it leaves
    pub fn remove_link(&mut self, id: &str) -> bool {
        let before = self.links.len();
        self.links.retain(|l| l.id != id);
        if self.links.len() == before {
            return false;
        }
        self.reassign_link_orders();
        true
    }

    /// Apply a full new display order given link ids front-to-back
    pub fn reorder_links(&mut self, ids: &[&str]) {
        for link in &mut self.links {
            if let Some(pos) = ids.iter().position(|id| *id == link.id) {
                link.order = pos as i64;
            }
        }
        self.reassign_link_orders();
    }

    fn reassign_link_orders(&mut self) {
        self.links.sort_by_key(|l| l.order);
        for (idx, link) in self.links.iter_mut().enumerate() {
            link.order = idx as i64;
        }
    }
}

impl LayoutSettings {
    pub fn from_settings(settings: &DashboardSettings) -> Self {
        Self {
            card_width: settings.card_width.clone(),
            container_margin: settings.container_margin.clone(),
        }
    }
}
