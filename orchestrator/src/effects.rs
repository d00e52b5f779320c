//! Hit-point effects shared by card draws and special room actions.

use anyhow::Result;
use tracing::debug;

use crate::core::board::CardEffect;
use crate::core::target::select_target;
use crate::core::types::{AgentId, AppliedEffect};
use crate::guard::TurnScope;
use crate::session::Session;

/// Apply `effect` on behalf of `subject`. `Ok(None)` when a write was refused
/// for a superseded turn.
pub async fn apply_effect(
    session: &Session,
    scope: &TurnScope,
    subject: AgentId,
    effect: CardEffect,
) -> Result<Option<Vec<AppliedEffect>>> {
    let (target, delta) = match effect {
        CardEffect::None => return Ok(Some(Vec::new())),
        CardEffect::Heal { amount } => (subject, i32::from(amount)),
        CardEffect::Damage { amount } => (subject, -i32::from(amount)),
        CardEffect::DamageNearest { amount } => {
            let agents = session.world.agents().await?;
            let Some(target) = select_target(&session.board, &agents, subject) else {
                debug!(agent = %subject, "no target in range; effect fizzles");
                return Ok(Some(Vec::new()));
            };
            (target, -i32::from(amount))
        }
    };
    let Some(hp_after) = adjust_hp(session, scope, target, delta).await? else {
        return Ok(None);
    };
    Ok(Some(vec![AppliedEffect {
        target,
        effect,
        hp_after,
    }]))
}

/// Shift `target`'s hp by `delta`, clamped to `0..=max_hp`.
pub async fn adjust_hp(
    session: &Session,
    scope: &TurnScope,
    target: AgentId,
    delta: i32,
) -> Result<Option<i32>> {
    let current = session.world.agent(target).await?.hp;
    let hp = (current + delta).clamp(0, session.max_hp.max(current));
    if !session.world.set_hp(scope, target, hp).await? {
        return Ok(None);
    }
    debug!(agent = %target, from = current, to = hp, "hp changed");
    Ok(Some(hp))
}
