use crate::{
    auth::auth::AuthAdmin,
    error::{AppError, AppResult},
    model::admin::{AdminResponse, AdminRow, SELECT_ADMIN},
    models::{AdminListResponse, AdminMessage, UpdateAdminRequest},
    utils::{
        admin_cache,
        db_utils::{UpdateSet, execute_update},
    },
};
use actix_web::{HttpResponse, web};
use sqlx::MySqlPool;
use tracing::info;

/// Rejects a super admin switching off their own account.
fn guard_self_update(caller_id: u64, target_id: u64, body: &UpdateAdminRequest) -> AppResult<()> {
    if caller_id == target_id && body.is_active == Some(false) {
        return Err(AppError::BadRequest(
            "You cannot deactivate your own account".into(),
        ));
    }
    Ok(())
}

fn admin_update(body: &UpdateAdminRequest) -> UpdateSet {
    let mut set = UpdateSet::new("admins");
    set.set_opt("role", body.role.map(|r| r.as_ref().to_string()))
        .set_opt("is_active", body.is_active);

    if let Some(p) = body.permissions {
        set.set("perm_students", p.students)
            .set("perm_employees", p.employees)
            .set("perm_finance", p.finance)
            .set("perm_library", p.library);
    }
    set
}

/// List admins (super admin only)
#[utoipa::path(
    get,
    path = "/api/admins",
    responses(
        (status = 200, description = "All admins, newest first", body = AdminListResponse),
        (status = 403, description = "Caller is not a super admin", body = MessageResponse)
    ),
    tag = "Admins",
    security(("bearer_auth" = []))
)]
pub async fn list_admins(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
) -> AppResult<HttpResponse> {
    auth.require_super_admin()?;

    let rows = sqlx::query_as::<_, AdminRow>(&format!("{SELECT_ADMIN} ORDER BY created_at DESC, id DESC"))
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| AppError::from_db("Error fetching admins", e))?;

    let admins = rows
        .into_iter()
        .map(|row| AdminResponse::from(&row.into_admin()))
        .collect();

    Ok(HttpResponse::Ok().json(AdminListResponse { admins }))
}

/// Change an admin's role, permissions or activation (super admin only)
#[utoipa::path(
    patch,
    path = "/api/admins/{id}",
    params(("id", Path, description = "Admin ID")),
    request_body = UpdateAdminRequest,
    responses(
        (status = 200, description = "Admin updated", body = AdminMessage),
        (status = 400, description = "Self-deactivation attempted", body = MessageResponse),
        (status = 403, description = "Caller is not a super admin", body = MessageResponse),
        (status = 404, description = "Admin not found", body = MessageResponse)
    ),
    tag = "Admins",
    security(("bearer_auth" = []))
)]
pub async fn update_admin(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateAdminRequest>,
) -> AppResult<HttpResponse> {
    auth.require_super_admin()?;
    let id = path.into_inner();
    guard_self_update(auth.id(), id, &body)?;

    if let Some(update) = admin_update(&body).build("id", id) {
        execute_update(pool.get_ref(), update)
            .await
            .map_err(|e| AppError::from_db("Error updating admin", e))?;
    }

    // The next request carrying this admin's token re-reads the row.
    admin_cache::invalidate(id).await;

    let admin = admin_cache::load_admin(pool.get_ref(), id)
        .await
        .map_err(|e| AppError::from_db("Error updating admin", e))?
        .ok_or_else(|| AppError::NotFound("Admin not found".into()))?;

    info!(
        admin_id = id,
        updated_by = auth.id(),
        is_active = admin.is_active,
        role = %admin.role,
        "Admin updated"
    );

    Ok(HttpResponse::Ok().json(AdminMessage {
        message: "Admin updated successfully".into(),
        admin: (&admin).into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::admin::{AdminRole, Permissions};
    use crate::utils::db_utils::SqlValue;
    use rstest::rstest;

    #[rstest]
    #[case(1, 1, Some(false), false)]
    #[case(1, 1, Some(true), true)]
    #[case(1, 1, None, true)]
    #[case(1, 2, Some(false), true)]
    fn only_self_deactivation_is_refused(
        #[case] caller: u64,
        #[case] target: u64,
        #[case] is_active: Option<bool>,
        #[case] allowed: bool,
    ) {
        let body = UpdateAdminRequest {
            is_active,
            ..UpdateAdminRequest::default()
        };
        assert_eq!(guard_self_update(caller, target, &body).is_ok(), allowed);
    }

    #[test]
    fn permissions_expand_to_flag_columns() {
        let body = UpdateAdminRequest {
            role: Some(AdminRole::SuperAdmin),
            permissions: Some(Permissions {
                finance: false,
                ..Permissions::default()
            }),
            is_active: None,
        };
        let update = admin_update(&body).build("id", 5).unwrap();

        assert_eq!(
            update.sql,
            "UPDATE admins SET role = ?, perm_students = ?, perm_employees = ?, \
             perm_finance = ?, perm_library = ? WHERE id = ?"
        );
        assert_eq!(update.values[0], SqlValue::String("super_admin".into()));
        assert_eq!(update.values[3], SqlValue::Bool(false));
    }
}
