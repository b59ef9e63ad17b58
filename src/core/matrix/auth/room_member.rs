//! m.room.member transition rules.

use std::future::Future;

use ruma::{
	UserId,
	events::{StateEventType, room::member::MembershipState},
};
use serde::Deserialize;

use super::{AuthError, AuthResult, membership_of};
use crate::matrix::{
	StateKey, pdu::Pdu, power::RoomPower, room_version::RoomVersion,
};

#[derive(Default, Deserialize)]
struct JoinRulesContent {
	join_rule: Option<String>,
}

pub(super) async fn check_room_member<F, Fut>(
	pdu: &Pdu,
	rules: &RoomVersion,
	create: &Pdu,
	creator: Option<&UserId>,
	power: &RoomPower,
	fetch_state: &F,
) -> AuthResult
where
	F: Fn(StateEventType, StateKey) -> Fut + Sync,
	Fut: Future<Output = Option<Pdu>> + Send,
{
	let state_key = pdu
		.state_key
		.as_deref()
		.expect("static checks guarantee a state_key");

	let target: &UserId = state_key
		.try_into()
		.expect("static checks guarantee a user id state_key");

	let membership = pdu
		.membership()
		.map_err(|e| AuthError::new("membership", e.to_string()))?;

	let sender_membership = membership_of(fetch_state, &pdu.sender).await;
	let target_membership = membership_of(fetch_state, target).await;

	match membership {
		| MembershipState::Join =>
			check_join(
				pdu,
				create,
				creator,
				target,
				&target_membership,
				fetch_state,
			)
			.await,
		| MembershipState::Invite =>
			check_invite(pdu, power, target, &sender_membership, &target_membership),
		| MembershipState::Leave =>
			check_leave(pdu, power, target, &sender_membership, &target_membership),
		| MembershipState::Ban => check_ban(pdu, power, target, &sender_membership),
		| MembershipState::Knock if rules.knocking =>
			check_knock(pdu, target, &target_membership, fetch_state).await,
		| _ => Err(AuthError::new("membership", "unknown membership")),
	}
}

async fn check_join<F, Fut>(
	pdu: &Pdu,
	create: &Pdu,
	creator: Option<&UserId>,
	target: &UserId,
	target_membership: &MembershipState,
	fetch_state: &F,
) -> AuthResult
where
	F: Fn(StateEventType, StateKey) -> Fut + Sync,
	Fut: Future<Output = Option<Pdu>> + Send,
{
	if pdu.sender != target {
		return Err(AuthError::new(
			"membership",
			"cannot set another user's membership to join",
		));
	}

	// The creator's first join rides directly on the create event.
	let prev_is_only_create = pdu.prev_events.len() == 1
		&& pdu
			.prev_events
			.first()
			.is_some_and(|prev| prev == &create.event_id);

	if prev_is_only_create && creator == Some(target) {
		return Ok(());
	}

	if *target_membership == MembershipState::Ban {
		return Err(AuthError::new("membership", "target user is banned"));
	}

	match join_rule(fetch_state).await.as_str() {
		| "public" => Ok(()),
		| "invite" | "knock" | "restricted" | "knock_restricted" => {
			if matches!(
				target_membership,
				MembershipState::Join | MembershipState::Invite
			) {
				Ok(())
			} else {
				Err(AuthError::new("membership", "joining requires an invite"))
			}
		},
		| rule => Err(AuthError::new(
			"membership",
			format!("join rule {rule:?} does not permit joining"),
		)),
	}
}

fn check_invite(
	pdu: &Pdu,
	power: &RoomPower,
	target: &UserId,
	sender_membership: &MembershipState,
	target_membership: &MembershipState,
) -> AuthResult {
	if *sender_membership != MembershipState::Join {
		return Err(AuthError::new("membership", "inviter is not joined to the room"));
	}

	if matches!(target_membership, MembershipState::Join | MembershipState::Ban) {
		return Err(AuthError::new(
			"membership",
			format!("{target} cannot be invited in membership {target_membership}"),
		));
	}

	if !power.allow(&pdu.sender, Some("invite"), None, None) {
		return Err(AuthError::new("power", "sender may not invite"));
	}

	Ok(())
}

fn check_leave(
	pdu: &Pdu,
	power: &RoomPower,
	target: &UserId,
	sender_membership: &MembershipState,
	target_membership: &MembershipState,
) -> AuthResult {
	// A user abandoning the room, or rejecting an invite or knock.
	if pdu.sender == target {
		return if matches!(
			target_membership,
			MembershipState::Join | MembershipState::Invite | MembershipState::Knock
		) {
			Ok(())
		} else {
			Err(AuthError::new(
				"membership",
				format!("cannot leave from membership {target_membership}"),
			))
		};
	}

	// Everything below is a kick.
	if *sender_membership != MembershipState::Join {
		return Err(AuthError::new("membership", "kicker is not joined to the room"));
	}

	let sender_level = power.level_user(&pdu.sender);
	if *target_membership == MembershipState::Ban && sender_level < power.level("ban") {
		return Err(AuthError::new("power", "sender may not lift a ban"));
	}

	if sender_level < power.level("kick") {
		return Err(AuthError::new("power", "sender may not kick"));
	}

	if sender_level <= power.level_user(target) {
		return Err(AuthError::new("power", "sender does not outrank the kicked user"));
	}

	Ok(())
}

fn check_ban(
	pdu: &Pdu,
	power: &RoomPower,
	target: &UserId,
	sender_membership: &MembershipState,
) -> AuthResult {
	if *sender_membership != MembershipState::Join {
		return Err(AuthError::new("membership", "banner is not joined to the room"));
	}

	let sender_level = power.level_user(&pdu.sender);
	if sender_level < power.level("ban") {
		return Err(AuthError::new("power", "sender may not ban"));
	}

	if sender_level <= power.level_user(target) {
		return Err(AuthError::new("power", "sender does not outrank the banned user"));
	}

	Ok(())
}

async fn check_knock<F, Fut>(
	pdu: &Pdu,
	target: &UserId,
	target_membership: &MembershipState,
	fetch_state: &F,
) -> AuthResult
where
	F: Fn(StateEventType, StateKey) -> Fut + Sync,
	Fut: Future<Output = Option<Pdu>> + Send,
{
	if pdu.sender != target {
		return Err(AuthError::new(
			"membership",
			"cannot set another user's membership to knock",
		));
	}

	if matches!(target_membership, MembershipState::Join | MembershipState::Ban) {
		return Err(AuthError::new(
			"membership",
			format!("cannot knock from membership {target_membership}"),
		));
	}

	match join_rule(fetch_state).await.as_str() {
		| "knock" | "knock_restricted" => Ok(()),
		| rule => Err(AuthError::new(
			"membership",
			format!("join rule {rule:?} does not permit knocking"),
		)),
	}
}

/// The room's join rule; rooms without the state default to invite.
async fn join_rule<F, Fut>(fetch_state: &F) -> String
where
	F: Fn(StateEventType, StateKey) -> Fut + Sync,
	Fut: Future<Output = Option<Pdu>> + Send,
{
	match fetch_state(StateEventType::RoomJoinRules, StateKey::new()).await {
		| Some(event) => event
			.get_content::<JoinRulesContent>()
			.ok()
			.and_then(|c| c.join_rule)
			.unwrap_or_else(|| "invite".to_owned()),
		| None => "invite".to_owned(),
	}
}
