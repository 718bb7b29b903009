//! Institutions, programs, users and API tokens.

use super::Registrar;
use crate::access::{Actor, Permission, Role};
use crate::cache::{TokenCache, forget_user};
use crate::credentials::{generate_token, hash_token, verify_token};
use crate::error::{RegistrarError, Result};
use crate::models::{Course, Institution, Program, User};
use crate::primitives::{
    InstitutionId, ProgramId, UserId, normalize_email, normalize_short_name, require_text,
};
use crate::storage::{RecordKind, RecordStore, WriteBatch};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Input for [`Registrar::create_institution`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInstitution {
    /// Display name.
    pub name: String,
    /// Unique short name.
    pub short_name: String,
}

/// Partial update of an institution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstitutionUpdate {
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Activate or deactivate (site admins only).
    #[serde(default)]
    pub active: Option<bool>,
}

/// Input for [`Registrar::create_program`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProgram {
    /// Display name.
    pub name: String,
    /// Short name, unique within the institution.
    pub short_name: String,
}

/// Input for [`Registrar::create_user`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    /// Home institution. Defaults to the caller's.
    #[serde(default)]
    pub institution_id: Option<InstitutionId>,
    /// Email, globally unique.
    pub email: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Role to grant.
    pub role: Role,
    /// Program memberships.
    #[serde(default)]
    pub program_ids: Vec<ProgramId>,
}

/// Partial update of a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    /// New email.
    #[serde(default)]
    pub email: Option<String>,
    /// New given name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// New family name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// New role.
    #[serde(default)]
    pub role: Option<Role>,
    /// Replacement program list.
    #[serde(default)]
    pub program_ids: Option<Vec<ProgramId>>,
    /// Activate or deactivate.
    #[serde(default)]
    pub active: Option<bool>,
}

impl UserUpdate {
    /// Whether the update only touches the user's own name fields.
    fn is_self_service(&self) -> bool {
        self.email.is_none()
            && self.role.is_none()
            && self.program_ids.is_none()
            && self.active.is_none()
    }
}

impl<S: RecordStore> Registrar<S> {
    // =========================================================================
    // BOOTSTRAP AND AUTHENTICATION
    // =========================================================================

    /// Create the first site admin and return it with its plaintext token.
    ///
    /// Refused once any site admin exists.
    pub fn bootstrap_site_admin(
        &mut self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<(User, String)> {
        if self
            .store
            .scan::<User>()?
            .iter()
            .any(|u| u.role == Role::SiteAdmin)
        {
            return Err(RegistrarError::conflict("a site admin already exists"));
        }
        let email = normalize_email(email)?;
        self.ensure_email_free(&email, None)?;

        let token = generate_token();
        let user = User {
            id: UserId(self.next_id(RecordKind::User)?),
            institution_id: None,
            email,
            first_name: require_text("first_name", first_name)?,
            last_name: last_name.trim().to_string(),
            role: Role::SiteAdmin,
            program_ids: Vec::new(),
            active: true,
            token_hash: Some(hash_token(&token)),
            created_at: Utc::now(),
        };
        self.store.put(&user)?;
        Ok((user, token))
    }

    /// Resolve a bearer token to its actor by scanning users.
    pub fn authenticate(&self, token: &str) -> Result<Actor> {
        let user = self.user_for_token(token)?;
        self.login_actor(&user)
    }

    /// Resolve a bearer token, consulting `cache` first.
    ///
    /// Cached entries are re-verified against the stored hash, so a revoked
    /// token fails even on a cache hit.
    pub fn authenticate_cached(&self, token: &str, cache: &mut TokenCache) -> Result<Actor> {
        let hash = hash_token(token);
        if let Some(user_id) = cache.get(&hash).copied() {
            if let Some(user) = self.store.get::<User>(user_id.0)? {
                if user
                    .token_hash
                    .as_deref()
                    .is_some_and(|stored| verify_token(token, stored))
                {
                    return self.login_actor(&user);
                }
            }
            cache.remove(&hash);
        }
        let user = self.user_for_token(token)?;
        let actor = self.login_actor(&user)?;
        cache.insert(hash, user.id);
        Ok(actor)
    }

    fn user_for_token(&self, token: &str) -> Result<User> {
        let token = token.trim();
        if token.is_empty() {
            return Err(RegistrarError::Unauthenticated);
        }
        self.store
            .scan::<User>()?
            .into_iter()
            .find(|u| {
                u.token_hash
                    .as_deref()
                    .is_some_and(|stored| verify_token(token, stored))
            })
            .ok_or(RegistrarError::Unauthenticated)
    }

    fn login_actor(&self, user: &User) -> Result<Actor> {
        if !user.active {
            return Err(RegistrarError::Unauthenticated);
        }
        if let Some(institution_id) = user.institution_id {
            let institution = self.store.get::<Institution>(institution_id.0)?;
            if !institution.is_some_and(|i| i.active) {
                return Err(RegistrarError::Unauthenticated);
            }
        }
        Ok(Actor::for_user(user))
    }

    // =========================================================================
    // INSTITUTIONS
    // =========================================================================

    /// Create an institution (site admins only).
    pub fn create_institution(&mut self, actor: &Actor, input: NewInstitution) -> Result<Institution> {
        actor.require(Permission::ManageInstitutions)?;
        let short_name = normalize_short_name(&input.short_name)?;
        if self.find_institution(&short_name)?.is_some() {
            return Err(RegistrarError::conflict(format!(
                "institution '{short_name}' already exists"
            )));
        }
        let institution = Institution {
            id: InstitutionId(self.next_id(RecordKind::Institution)?),
            name: require_text("name", &input.name)?,
            short_name,
            active: true,
            created_at: Utc::now(),
        };
        self.store.put(&institution)?;
        Ok(institution)
    }

    /// Fetch an institution the caller belongs to.
    pub fn get_institution(&self, actor: &Actor, id: InstitutionId) -> Result<Institution> {
        self.load_scoped(actor, id.0, "institution")
    }

    /// Institutions visible to the caller.
    pub fn list_institutions(&self, actor: &Actor) -> Result<Vec<Institution>> {
        Ok(self
            .store
            .scan::<Institution>()?
            .into_iter()
            .filter(|i| actor.can_see(i.id))
            .collect())
    }

    /// Look up an institution by short name (case-insensitive).
    pub fn find_institution(&self, short_name: &str) -> Result<Option<Institution>> {
        let wanted = short_name.trim().to_uppercase();
        Ok(self
            .store
            .scan::<Institution>()?
            .into_iter()
            .find(|i| i.short_name == wanted))
    }

    /// Rename or (de)activate an institution.
    ///
    /// Institution admins may rename their own institution. Only site admins
    /// change `active`.
    pub fn update_institution(
        &mut self,
        actor: &Actor,
        id: InstitutionId,
        update: InstitutionUpdate,
    ) -> Result<Institution> {
        let mut institution: Institution = self.load_scoped(actor, id.0, "institution")?;
        if !actor.is_site_admin() {
            if actor.role != Role::InstitutionAdmin || update.active.is_some() {
                return Err(RegistrarError::forbidden(format!(
                    "{} may not change institution {id}",
                    actor.role
                )));
            }
        }
        if let Some(name) = update.name {
            institution.name = require_text("name", &name)?;
        }
        if let Some(active) = update.active {
            institution.active = active;
        }
        self.store.put(&institution)?;
        Ok(institution)
    }

    // =========================================================================
    // PROGRAMS
    // =========================================================================

    /// Create a program in `institution`.
    pub fn create_program(
        &mut self,
        actor: &Actor,
        institution: InstitutionId,
        input: NewProgram,
    ) -> Result<Program> {
        let institution: Institution = self.load_scoped(actor, institution.0, "institution")?;
        actor.require(Permission::ManagePrograms)?;
        let short_name = normalize_short_name(&input.short_name)?;
        if self.find_program(institution.id, &short_name)?.is_some() {
            return Err(RegistrarError::conflict(format!(
                "program '{short_name}' already exists in {}",
                institution.short_name
            )));
        }
        let program = Program {
            id: ProgramId(self.next_id(RecordKind::Program)?),
            institution_id: institution.id,
            name: require_text("name", &input.name)?,
            short_name,
            created_at: Utc::now(),
        };
        self.store.put(&program)?;
        Ok(program)
    }

    /// Programs of an institution.
    pub fn list_programs(
        &self,
        actor: &Actor,
        institution: Option<InstitutionId>,
    ) -> Result<Vec<Program>> {
        actor.require(Permission::ViewInstitution)?;
        let institution = actor.resolve_institution(institution)?;
        self.store.scan_tenant(institution)
    }

    /// Look up a program by short name within an institution.
    pub fn find_program(
        &self,
        institution: InstitutionId,
        short_name: &str,
    ) -> Result<Option<Program>> {
        let wanted = short_name.trim().to_uppercase();
        Ok(self
            .store
            .scan_tenant::<Program>(institution)?
            .into_iter()
            .find(|p| p.short_name == wanted))
    }

    /// Change a program's display name. The short name is its key and stays.
    pub fn rename_program(&mut self, actor: &Actor, id: ProgramId, name: &str) -> Result<Program> {
        let mut program: Program = self.load_scoped(actor, id.0, "program")?;
        actor.require(Permission::ManagePrograms)?;
        program.name = require_text("name", name)?;
        self.store.put(&program)?;
        Ok(program)
    }

    /// Delete a program, detaching it from courses and users.
    pub fn delete_program(&mut self, actor: &Actor, id: ProgramId) -> Result<()> {
        let program: Program = self.load_scoped(actor, id.0, "program")?;
        actor.require(Permission::ManagePrograms)?;

        let mut batch = WriteBatch::new();
        for mut course in self.store.scan_tenant::<Course>(program.institution_id)? {
            if course.program_ids.contains(&id) {
                course.program_ids.retain(|p| *p != id);
                batch.put(&course)?;
            }
        }
        for mut user in self.store.scan_tenant::<User>(program.institution_id)? {
            if user.program_ids.contains(&id) {
                user.program_ids.retain(|p| *p != id);
                batch.put(&user)?;
            }
        }
        batch.remove::<Program>(id.0);
        self.store.apply(batch)
    }

    /// Check that every program id exists in `institution`.
    pub(crate) fn check_programs(
        &self,
        institution: InstitutionId,
        programs: &[ProgramId],
    ) -> Result<()> {
        for program_id in programs {
            let program = self.store.get::<Program>(program_id.0)?;
            if !program.is_some_and(|p| p.institution_id == institution) {
                return Err(RegistrarError::validation(format!(
                    "program {program_id} does not belong to institution {institution}"
                )));
            }
        }
        Ok(())
    }

    // =========================================================================
    // USERS
    // =========================================================================

    /// Create a user account. No token is issued.
    pub fn create_user(&mut self, actor: &Actor, input: NewUser) -> Result<User> {
        let institution = if input.role == Role::SiteAdmin {
            None
        } else {
            input.institution_id.or(actor.institution_id)
        };
        if let Some(institution) = institution {
            let _: Institution = self.load_scoped(actor, institution.0, "institution")?;
        }
        actor.ensure_can_grant(input.role, institution)?;

        let email = normalize_email(&input.email)?;
        self.ensure_email_free(&email, None)?;

        let mut program_ids = input.program_ids;
        program_ids.sort_unstable();
        program_ids.dedup();
        if let Some(institution) = institution {
            self.check_programs(institution, &program_ids)?;
        } else if !program_ids.is_empty() {
            return Err(RegistrarError::validation(
                "site admins cannot belong to programs",
            ));
        }
        self.ensure_program_overlap(actor, &program_ids)?;

        let user = User {
            id: UserId(self.next_id(RecordKind::User)?),
            institution_id: institution,
            email,
            first_name: require_text("first_name", &input.first_name)?,
            last_name: input.last_name.trim().to_string(),
            role: input.role,
            program_ids,
            active: true,
            token_hash: None,
            created_at: Utc::now(),
        };
        self.store.put(&user)?;
        Ok(user)
    }

    /// Fetch a user. Callers may always read themselves.
    pub fn get_user(&self, actor: &Actor, id: UserId) -> Result<User> {
        let user: User = self.load_scoped(actor, id.0, "user")?;
        if user.id != actor.user_id {
            actor.require(Permission::ManageUsers)?;
        }
        Ok(user)
    }

    /// Users of an institution. Site admins may pass `None` to list everyone.
    pub fn list_users(&self, actor: &Actor, institution: Option<InstitutionId>) -> Result<Vec<User>> {
        actor.require(Permission::ManageUsers)?;
        if actor.is_site_admin() && institution.is_none() {
            return self.store.scan();
        }
        let institution = actor.resolve_institution(institution)?;
        self.store.scan_tenant(institution)
    }

    /// Look up a user by email.
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = normalize_email(email)?;
        Ok(self
            .store
            .scan::<User>()?
            .into_iter()
            .find(|u| u.email == email))
    }

    /// Update a user. Users may change their own names without any
    /// permission.
    pub fn update_user(&mut self, actor: &Actor, id: UserId, update: UserUpdate) -> Result<User> {
        let mut user: User = self.load_scoped(actor, id.0, "user")?;
        let is_self = user.id == actor.user_id;
        if !(is_self && update.is_self_service()) {
            actor.ensure_can_grant(user.role, user.institution_id)?;
        }
        if is_self && update.active == Some(false) {
            return Err(RegistrarError::validation("you cannot deactivate yourself"));
        }

        if let Some(email) = update.email {
            let email = normalize_email(&email)?;
            self.ensure_email_free(&email, Some(user.id))?;
            user.email = email;
        }
        if let Some(first_name) = update.first_name {
            user.first_name = require_text("first_name", &first_name)?;
        }
        if let Some(last_name) = update.last_name {
            user.last_name = last_name.trim().to_string();
        }
        if let Some(role) = update.role {
            actor.ensure_can_grant(role, user.institution_id)?;
            if (role == Role::SiteAdmin) != user.institution_id.is_none() {
                return Err(RegistrarError::validation(
                    "site admins have no institution and everyone else has one",
                ));
            }
            user.role = role;
        }
        if let Some(mut program_ids) = update.program_ids {
            program_ids.sort_unstable();
            program_ids.dedup();
            if let Some(institution) = user.institution_id {
                self.check_programs(institution, &program_ids)?;
            }
            self.ensure_program_overlap(actor, &program_ids)?;
            user.program_ids = program_ids;
        }
        if let Some(active) = update.active {
            user.active = active;
        }
        self.store.put(&user)?;
        Ok(user)
    }

    /// Issue a new API token for a user, replacing any previous one.
    ///
    /// The plaintext token is returned once. Only its hash is stored.
    pub fn issue_token(&mut self, actor: &Actor, id: UserId) -> Result<(User, String)> {
        let mut user: User = self.load_scoped(actor, id.0, "user")?;
        if user.id != actor.user_id {
            actor.ensure_can_grant(user.role, user.institution_id)?;
        }
        if !user.active {
            return Err(RegistrarError::validation(format!(
                "user {} is inactive",
                user.email
            )));
        }
        let token = generate_token();
        user.token_hash = Some(hash_token(&token));
        self.store.put(&user)?;
        Ok((user, token))
    }

    /// Revoke a user's API token.
    pub fn revoke_token(
        &mut self,
        actor: &Actor,
        id: UserId,
        cache: Option<&mut TokenCache>,
    ) -> Result<User> {
        let mut user: User = self.load_scoped(actor, id.0, "user")?;
        if user.id != actor.user_id {
            actor.ensure_can_grant(user.role, user.institution_id)?;
        }
        user.token_hash = None;
        self.store.put(&user)?;
        if let Some(cache) = cache {
            forget_user(cache, user.id);
        }
        Ok(user)
    }

    fn ensure_email_free(&self, email: &str, except: Option<UserId>) -> Result<()> {
        let taken = self
            .store
            .scan::<User>()?
            .iter()
            .any(|u| u.email == email && Some(u.id) != except);
        if taken {
            return Err(RegistrarError::conflict(format!(
                "a user with email {email} already exists"
            )));
        }
        Ok(())
    }

    /// Program admins may only hand out programs they belong to.
    fn ensure_program_overlap(&self, actor: &Actor, programs: &[ProgramId]) -> Result<()> {
        if actor.role == Role::ProgramAdmin {
            if let Some(outside) = programs.iter().find(|p| !actor.program_ids.contains(p)) {
                return Err(RegistrarError::forbidden(format!(
                    "program {outside} is outside your programs"
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::token_cache;
    use crate::registrar::tests::fixture;
    use crate::storage::MemoryStore;

    #[test]
    fn bootstrap_only_once() -> Result<()> {
        let mut registrar = Registrar::new(MemoryStore::new());
        let (user, token) = registrar.bootstrap_site_admin("Root@Example.edu", "Root", "")?;
        assert_eq!(user.email, "root@example.edu");
        assert_eq!(registrar.authenticate(&token)?.role, Role::SiteAdmin);

        let again = registrar.bootstrap_site_admin("other@example.edu", "Other", "");
        assert!(matches!(again, Err(RegistrarError::Conflict(_))));
        Ok(())
    }

    #[test]
    fn duplicate_short_names_conflict() -> Result<()> {
        let mut fx = fixture()?;
        let dup = fx.registrar.create_institution(
            &fx.site,
            NewInstitution {
                name: "Another".into(),
                short_name: " MCC ".into(),
            },
        );
        assert!(matches!(dup, Err(RegistrarError::Conflict(_))));

        let dup = fx.registrar.create_program(
            &fx.admin,
            fx.institution.id,
            NewProgram {
                name: "CS again".into(),
                short_name: "CS".into(),
            },
        );
        assert!(matches!(dup, Err(RegistrarError::Conflict(_))));
        Ok(())
    }

    #[test]
    fn other_tenants_see_not_found() -> Result<()> {
        let mut fx = fixture()?;
        let other = fx.registrar.create_institution(
            &fx.site,
            NewInstitution {
                name: "City Engineering Institute".into(),
                short_name: "CEI".into(),
            },
        )?;
        let outsider = fx.registrar.create_user(
            &fx.site,
            NewUser {
                institution_id: Some(other.id),
                email: "boss@cei.edu".into(),
                first_name: "Bo".into(),
                last_name: "Ss".into(),
                role: Role::InstitutionAdmin,
                program_ids: Vec::new(),
            },
        )?;
        let outsider = Actor::for_user(&outsider);

        let err = fx.registrar.get_institution(&outsider, fx.institution.id);
        assert!(matches!(err, Err(RegistrarError::NotFound { .. })));
        let err = fx.registrar.get_user(&outsider, fx.instructor_user.id);
        assert!(matches!(err, Err(RegistrarError::NotFound { .. })));
        assert_eq!(fx.registrar.list_institutions(&outsider)?.len(), 1);
        Ok(())
    }

    #[test]
    fn cannot_grant_above_own_role() -> Result<()> {
        let mut fx = fixture()?;
        let err = fx.registrar.create_user(
            &fx.admin,
            NewUser {
                institution_id: None,
                email: "sneaky@mcc.edu".into(),
                first_name: "S".into(),
                last_name: "N".into(),
                role: Role::SiteAdmin,
                program_ids: Vec::new(),
            },
        );
        assert!(matches!(err, Err(RegistrarError::Forbidden(_))));

        let err = fx.registrar.create_user(
            &fx.instructor,
            NewUser {
                institution_id: None,
                email: "peer@mcc.edu".into(),
                first_name: "P".into(),
                last_name: "E".into(),
                role: Role::Instructor,
                program_ids: Vec::new(),
            },
        );
        assert!(matches!(err, Err(RegistrarError::Forbidden(_))));
        Ok(())
    }

    #[test]
    fn duplicate_email_conflicts() -> Result<()> {
        let mut fx = fixture()?;
        let err = fx.registrar.create_user(
            &fx.admin,
            NewUser {
                institution_id: None,
                email: "IVY@mcc.edu".into(),
                first_name: "Ivy".into(),
                last_name: "Two".into(),
                role: Role::Instructor,
                program_ids: Vec::new(),
            },
        );
        assert!(matches!(err, Err(RegistrarError::Conflict(_))));
        Ok(())
    }

    #[test]
    fn tokens_issue_and_revoke() -> Result<()> {
        let mut fx = fixture()?;
        let id = fx.instructor_user.id;
        let (_, token) = fx.registrar.issue_token(&fx.admin, id)?;
        let mut cache = token_cache(16);

        let actor = fx.registrar.authenticate_cached(&token, &mut cache)?;
        assert_eq!(actor.user_id, id);
        assert_eq!(cache.len(), 1);

        fx.registrar.revoke_token(&fx.admin, id, None)?;
        let err = fx.registrar.authenticate_cached(&token, &mut cache);
        assert!(matches!(err, Err(RegistrarError::Unauthenticated)));
        assert!(cache.is_empty());
        Ok(())
    }

    #[test]
    fn inactive_institution_blocks_login() -> Result<()> {
        let mut fx = fixture()?;
        let (_, token) = fx.registrar.issue_token(&fx.admin, fx.instructor_user.id)?;
        fx.registrar.update_institution(
            &fx.site,
            fx.institution.id,
            InstitutionUpdate {
                name: None,
                active: Some(false),
            },
        )?;
        assert!(matches!(
            fx.registrar.authenticate(&token),
            Err(RegistrarError::Unauthenticated)
        ));
        Ok(())
    }

    #[test]
    fn instructors_may_rename_themselves_only() -> Result<()> {
        let mut fx = fixture()?;
        let id = fx.instructor_user.id;
        let renamed = fx.registrar.update_user(
            &fx.instructor,
            id,
            UserUpdate {
                first_name: Some("Ivana".into()),
                ..UserUpdate::default()
            },
        )?;
        assert_eq!(renamed.first_name, "Ivana");

        let err = fx.registrar.update_user(
            &fx.instructor,
            id,
            UserUpdate {
                role: Some(Role::InstitutionAdmin),
                ..UserUpdate::default()
            },
        );
        assert!(matches!(err, Err(RegistrarError::Forbidden(_))));
        Ok(())
    }

    #[test]
    fn deleting_a_program_detaches_it() -> Result<()> {
        let mut fx = fixture()?;
        let program = fx.course.program_ids[0];
        fx.registrar.delete_program(&fx.admin, program)?;
        let course = fx.registrar.get_course(&fx.admin, fx.course.id)?;
        assert!(course.program_ids.is_empty());
        let user = fx.registrar.get_user(&fx.admin, fx.instructor_user.id)?;
        assert!(user.program_ids.is_empty());
        Ok(())
    }
}
