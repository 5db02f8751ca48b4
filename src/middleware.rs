// middleware.rs
//
// Actor context extraction. Authentication itself happens upstream (API
// gateway); by the time a request reaches this service the caller's identity
// and role grants arrive as trusted headers. Roles are parsed once here into
// a closed capability set; nothing downstream re-inspects role strings.
use axum::{extract::Request, middleware::Next, response::IntoResponse};
use uuid::Uuid;

use crate::error::HttpError;

#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub id: Uuid,
    pub can_act_as_customer: bool,
    pub can_act_as_hustler: bool,
    pub is_admin: bool,
}

#[cfg(test)]
impl Actor {
    pub fn customer(id: Uuid) -> Self {
        Actor {
            id,
            can_act_as_customer: true,
            can_act_as_hustler: false,
            is_admin: false,
        }
    }

    pub fn hustler(id: Uuid) -> Self {
        Actor {
            id,
            can_act_as_customer: false,
            can_act_as_hustler: true,
            is_admin: false,
        }
    }

    pub fn admin(id: Uuid) -> Self {
        Actor {
            id,
            can_act_as_customer: false,
            can_act_as_hustler: false,
            is_admin: true,
        }
    }
}

pub async fn require_actor(
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, HttpError> {
    let id = req
        .headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| {
            HttpError::new(
                "missing or invalid x-user-id header",
                axum::http::StatusCode::UNAUTHORIZED,
            )
        })?;

    let roles = req
        .headers()
        .get("x-user-roles")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let roles: Vec<&str> = roles.split(',').map(|r| r.trim()).collect();

    let actor = Actor {
        id,
        can_act_as_customer: roles.contains(&"customer"),
        can_act_as_hustler: roles.contains(&"hustler"),
        is_admin: roles.contains(&"admin"),
    };

    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}
