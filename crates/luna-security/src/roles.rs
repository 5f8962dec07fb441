use luna_common::{Error, Result, TeamRole, UserId};

/// Resolve what `user` may do in a team created by `creator`.
///
/// The creator is always `Owner`, whether or not a membership row exists;
/// everyone else gets the role on their membership row, or nothing.
pub fn resolve_team_role(
    creator: &UserId,
    membership: Option<TeamRole>,
    user: &UserId,
) -> Option<TeamRole> {
    if creator == user {
        return Some(TeamRole::Owner);
    }
    membership.filter(|role| role.is_assignable())
}

/// Reject member-management operations that target the team creator.
pub fn ensure_not_creator(creator: &UserId, target: &UserId) -> Result<()> {
    if creator == target {
        return Err(Error::Forbidden(
            "the team owner's membership cannot be changed or removed".into(),
        ));
    }
    Ok(())
}

/// Require at least `needed`, mapping a missing role to not-found so that
/// outsiders cannot probe for team ids.
pub fn require_role(role: Option<TeamRole>, needed: TeamRole) -> Result<TeamRole> {
    match role {
        None => Err(Error::NotFound("team".into())),
        Some(role) if role >= needed => Ok(role),
        Some(role) => Err(Error::Forbidden(format!(
            "this action requires the {needed} role (you are {role})"
        ))),
    }
}
