//! Typed calls for the auth, registration, invite and resume endpoints.

use base64::prelude::*;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{retry_with_backoff_if, ApiClient};
use crate::error::{ErrorKind, NormalizedError};
use crate::session::{Role, Session, SessionStore};
use crate::validation::{validate_email, validate_password, validate_phone, validate_required, FieldCheck};

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginOutcome {
    pub session: Session,
    /// Greeting text returned by face login, if any.
    pub greeting: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompanyRegistration {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CompanyRegistration {
    /// Field errors, empty when the form may be submitted.
    pub fn validate(&self) -> crate::error::FieldErrors {
        let mut check = FieldCheck::default();
        check
            .check("name", validate_required(&self.name, "Company name"))
            .check("email", validate_required(&self.email, "Email"))
            .check("email", validate_email(&self.email))
            .check("password", validate_password(&self.password).map_err(|e| e.join(". ")));
        if let Some(phone) = self.phone.as_deref().filter(|p| !p.trim().is_empty()) {
            check.check("phone", validate_phone(phone));
        }
        if let Some(website) = self.website.as_deref().filter(|w| !w.trim().is_empty()) {
            check.check(
                "website",
                url::Url::parse(website)
                    .map(|_| ())
                    .map_err(|_| "Please enter a valid URL".to_string()),
            );
        }
        check.finish()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ManagerRegistration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub company_id: String,
}

impl ManagerRegistration {
    pub fn validate(&self) -> crate::error::FieldErrors {
        FieldCheck::default()
            .check("first_name", validate_required(&self.first_name, "First name"))
            .check("last_name", validate_required(&self.last_name, "Last name"))
            .check("email", validate_required(&self.email, "Email"))
            .check("email", validate_email(&self.email))
            .check("password", validate_password(&self.password).map_err(|e| e.join(". ")))
            .check("company_id", validate_required(&self.company_id, "Company"))
            .finish()
    }
}

/// Identifiers issued by a successful registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationReceipt {
    pub company_id: Option<String>,
    pub manager_id: Option<String>,
    pub company_name: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanySummary {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteLink {
    pub invite_token: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeAnalysis {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub analysis: Value,
    #[serde(default)]
    pub message: Option<String>,
}

/// Loosely shaped auth/registration response; ids arrive as numbers or strings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuthResponse {
    success: Option<bool>,
    token: Option<String>,
    company_id: Option<Value>,
    company_name: Option<String>,
    company_industry: Option<String>,
    manager_id: Option<Value>,
    manager_name: Option<String>,
    employee_id: Option<Value>,
    name: Option<String>,
    designation: Option<String>,
    company: Option<String>,
    email: Option<String>,
    message: Option<String>,
    error: Option<String>,
    detail: Option<String>,
    voice_greeting: Option<String>,
}

impl AuthResponse {
    /// Token of a successful response, or the server's reason for refusing.
    fn require_token(&mut self) -> Result<String, NormalizedError> {
        match (self.success, self.token.take().filter(|t| !t.is_empty())) {
            (Some(false), _) | (_, None) => {
                let message = [&self.message, &self.detail, &self.error]
                    .into_iter()
                    .flatten()
                    .find(|m| !m.trim().is_empty())
                    .cloned()
                    .unwrap_or_else(|| "Login response did not include a token.".to_string());
                Err(NormalizedError::new(ErrorKind::Unauthenticated, message))
            }
            (_, Some(token)) => Ok(token),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompanyList {
    #[serde(default)]
    companies: Vec<CompanySummary>,
}

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn opt_id(value: &Option<Value>) -> Option<String> {
    value.as_ref().and_then(value_to_id)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_id(&value).ok_or_else(|| serde::de::Error::custom("expected string or numeric id"))
}

fn credentials(email: &str, password: &str) -> Value {
    serde_json::json!({
        "email": email.trim().to_lowercase(),
        "password": password,
    })
}

fn reject_invalid(errors: crate::error::FieldErrors) -> Result<(), NormalizedError> {
    if errors.is_empty() {
        Ok(())
    } else {
        tracing::debug!(fields = ?errors.keys().collect::<Vec<_>>(), "Form rejected before submit");
        Err(NormalizedError::validation(errors))
    }
}

impl<S: SessionStore> ApiClient<S> {
    /// POST /company/login/
    pub async fn login_company(&self, email: &str, password: &str) -> Result<LoginOutcome, NormalizedError> {
        let mut res: AuthResponse = self.post("/company/login/", &credentials(email, password)).await?;
        let token = res.require_token()?;
        let company_name = non_empty(res.company_name);
        Ok(LoginOutcome {
            session: Session {
                token: Some(token),
                role: Some(Role::Company),
                company_id: opt_id(&res.company_id),
                display_name: company_name.clone(),
                company_name,
                industry: non_empty(res.company_industry),
                email: Some(email.trim().to_lowercase()),
                ..Default::default()
            },
            greeting: None,
        })
    }

    /// POST /managers/login/
    pub async fn login_manager(&self, email: &str, password: &str) -> Result<LoginOutcome, NormalizedError> {
        let mut res: AuthResponse = self.post("/managers/login/", &credentials(email, password)).await?;
        let token = res.require_token()?;
        Ok(LoginOutcome {
            session: Session {
                token: Some(token),
                role: Some(Role::Manager),
                manager_id: opt_id(&res.manager_id),
                company_id: opt_id(&res.company_id),
                company_name: non_empty(res.company_name),
                display_name: non_empty(res.manager_name),
                email: Some(email.trim().to_lowercase()),
                ..Default::default()
            },
            greeting: None,
        })
    }

    /// POST /company/employee/login/
    pub async fn login_employee(&self, email: &str, password: &str) -> Result<LoginOutcome, NormalizedError> {
        let mut res: AuthResponse = self
            .post("/company/employee/login/", &credentials(email, password))
            .await?;
        let token = res.require_token()?;
        let email = email.trim().to_lowercase();
        Ok(LoginOutcome {
            session: employee_session(token, res, Some(email)),
            greeting: None,
        })
    }

    /// POST /company/face/login/ with a captured frame as a JPEG data URL.
    pub async fn face_login(&self, image: &[u8]) -> Result<LoginOutcome, NormalizedError> {
        let data_url = format!("data:image/jpeg;base64,{}", BASE64_STANDARD.encode(image));
        let mut res: AuthResponse = self
            .post("/company/face/login/", &serde_json::json!({ "image": data_url }))
            .await?;
        let token = res.require_token()?;
        let greeting = non_empty(res.voice_greeting.take());
        let email = non_empty(res.email.take());
        Ok(LoginOutcome {
            session: employee_session(token, res, email),
            greeting,
        })
    }

    /// Store the outcome's session, replacing whatever was there.
    pub fn establish(&self, outcome: &LoginOutcome) -> Result<(), NormalizedError> {
        self.store().set(&outcome.session).map_err(|e| {
            tracing::error!(error = %e, "Failed to persist session");
            NormalizedError::new(ErrorKind::UnknownError, "An unexpected error occurred.")
        })?;
        tracing::debug!(role = ?outcome.session.role, "Session established");
        Ok(())
    }

    pub fn logout(&self) -> Result<(), NormalizedError> {
        self.store().clear().map_err(|e| {
            tracing::error!(error = %e, "Failed to clear session");
            NormalizedError::new(ErrorKind::UnknownError, "An unexpected error occurred.")
        })?;
        tracing::info!("Logged out");
        Ok(())
    }

    /// POST /company/register/
    pub async fn register_company(
        &self,
        registration: &CompanyRegistration,
    ) -> Result<RegistrationReceipt, NormalizedError> {
        reject_invalid(registration.validate())?;
        let res: AuthResponse = self.post("/company/register/", registration).await?;
        Ok(RegistrationReceipt {
            company_id: opt_id(&res.company_id),
            manager_id: opt_id(&res.manager_id),
            company_name: res.company_name,
            message: res.message,
        })
    }

    /// POST /managers/register/
    pub async fn register_manager(
        &self,
        registration: &ManagerRegistration,
    ) -> Result<RegistrationReceipt, NormalizedError> {
        reject_invalid(registration.validate())?;
        let res: AuthResponse = self.post("/managers/register/", registration).await?;
        Ok(RegistrationReceipt {
            company_id: opt_id(&res.company_id),
            manager_id: opt_id(&res.manager_id),
            company_name: res.company_name,
            message: res.message,
        })
    }

    /// GET /company/list/
    pub async fn list_companies(&self) -> Result<Vec<CompanySummary>, NormalizedError> {
        let list: CompanyList = self.get("/company/list/").await?;
        Ok(list.companies)
    }

    /// POST /company/employees/create-invite/, retried with backoff.
    pub async fn create_invite(&self) -> Result<InviteLink, NormalizedError> {
        let policy = self.retry_policy();
        retry_with_backoff_if(policy, NormalizedError::is_transient, move || async move {
            self.post::<_, InviteLink>("/company/employees/create-invite/", &serde_json::json!({}))
                .await
        })
        .await
    }

    /// POST /employees/analyze-resume/ as multipart with `resume` and `token` parts.
    pub async fn analyze_resume(
        &self,
        file_name: &str,
        contents: Vec<u8>,
        invite_token: &str,
    ) -> Result<ResumeAnalysis, NormalizedError> {
        let part = Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str(resume_mime(file_name))
            .map_err(|e| {
                crate::error::normalize(&crate::error::HttpFailure::NotSent {
                    reason: e.to_string(),
                })
            })?;
        let form = Form::new()
            .part("resume", part)
            .text("token", invite_token.to_string());
        self.post_multipart("/employees/analyze-resume/", form).await
    }
}

fn employee_session(token: String, res: AuthResponse, email: Option<String>) -> Session {
    Session {
        token: Some(token),
        role: Some(Role::Employee),
        employee_id: opt_id(&res.employee_id),
        display_name: non_empty(res.name),
        designation: non_empty(res.designation),
        company_name: non_empty(res.company),
        email,
        ..Default::default()
    }
}

fn resume_mime(file_name: &str) -> &'static str {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".pdf") {
        "application/pdf"
    } else if lower.ends_with(".docx") {
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    } else if lower.ends_with(".doc") {
        "application/msword"
    } else {
        "application/octet-stream"
    }
}
