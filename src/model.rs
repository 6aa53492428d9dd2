use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Faculty,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityCategory {
    Academic,
    Extracurricular,
    Research,
    CommunityService,
    Leadership,
    Internship,
    Competition,
    Certification,
    Conference,
    Workshop,
}

impl ActivityCategory {
    pub const ALL: [ActivityCategory; 10] = [
        ActivityCategory::Academic,
        ActivityCategory::Extracurricular,
        ActivityCategory::Research,
        ActivityCategory::CommunityService,
        ActivityCategory::Leadership,
        ActivityCategory::Internship,
        ActivityCategory::Competition,
        ActivityCategory::Certification,
        ActivityCategory::Conference,
        ActivityCategory::Workshop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityCategory::Academic => "academic",
            ActivityCategory::Extracurricular => "extracurricular",
            ActivityCategory::Research => "research",
            ActivityCategory::CommunityService => "community-service",
            ActivityCategory::Leadership => "leadership",
            ActivityCategory::Internship => "internship",
            ActivityCategory::Competition => "competition",
            ActivityCategory::Certification => "certification",
            ActivityCategory::Conference => "conference",
            ActivityCategory::Workshop => "workshop",
        }
    }

    /// Points awarded when an activity in this category is approved and the
    /// approver does not supply an explicit value.
    pub fn default_points(self) -> i64 {
        match self {
            ActivityCategory::Academic => 10,
            ActivityCategory::Extracurricular => 5,
            ActivityCategory::Research => 25,
            ActivityCategory::CommunityService => 10,
            ActivityCategory::Leadership => 15,
            ActivityCategory::Internship => 20,
            ActivityCategory::Competition => 15,
            ActivityCategory::Certification => 10,
            ActivityCategory::Conference => 10,
            ActivityCategory::Workshop => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Conference,
    Workshop,
    Seminar,
    Certification,
    Competition,
    Internship,
    Volunteer,
    Leadership,
    Research,
    Publication,
    Project,
    Course,
    Hackathon,
    Sports,
    Cultural,
    Technical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub name: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semester: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: ActivityCategory,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificates: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    pub status: ActivityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<i64>,
    pub student_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Template {
    Modern,
    Classic,
    Minimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: String,
    pub issuer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_url: Option<String>,
    pub category: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub level: SkillLevel,
    pub category: String,
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Ongoing,
    Completed,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub title: String,
    pub description: String,
    pub technologies: Vec<String>,
    pub start_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    pub status: ProjectStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub id: String,
    pub student_id: String,
    #[serde(default)]
    pub achievements: Vec<Achievement>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub projects: Vec<Project>,
    pub template: Template,
    pub is_public: bool,
    pub last_generated: String,
    pub download_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub read: bool,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
}

/// Passwords live only in the stored representation. Every user record that
/// leaves the daemon goes through here first.
pub fn strip_password(mut user: Value) -> Value {
    if let Some(obj) = user.as_object_mut() {
        obj.remove("password");
    }
    user
}
