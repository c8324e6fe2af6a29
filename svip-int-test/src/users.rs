//! User records of a small application going through three schema versions.
//!
//! - `1`: `{name, age}`
//! - `2`: `addField` adds `email`
//! - `3`: `renameField` renames `name` to `full_name`

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use svip::errors::{ErrorKind, SvipError, SvipResult};
use svip::migration::MigrationStep;
use svip_fjall_adapter::FjallState;

pub const USERS: &str = "users";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserV1 {
    pub name: String,
    pub age: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserV2 {
    pub name: String,
    pub age: u32,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserV3 {
    pub full_name: String,
    pub age: u32,
    pub email: Option<String>,
}

/// Inserts version `1` users.
pub fn seed(state: &FjallState, users: &[UserV1]) -> SvipResult<()> {
    let partition = state.partition(USERS)?;
    for user in users {
        state.put(&partition, &user.name.to_lowercase(), user)?;
    }
    Ok(())
}

/// Every user of the partition, decoded as `T`, ordered by key.
pub fn load<T: DeserializeOwned>(state: &FjallState) -> SvipResult<Vec<(String, T)>> {
    let partition = state.partition(USERS)?;
    let mut keys = Vec::new();
    for entry in partition.iter() {
        let (key, _) = entry.map_err(|e| SvipError::new(&e.to_string(), ErrorKind::BackendError))?;
        keys.push(String::from_utf8_lossy(&key).to_string());
    }

    let mut users = Vec::with_capacity(keys.len());
    for key in keys {
        if let Some(user) = state.get(&partition, &key)? {
            users.push((key, user));
        }
    }
    Ok(users)
}

fn rewrite<F, T, U>(state: &FjallState, convert: F) -> SvipResult<()>
where
    F: Fn(T) -> SvipResult<U>,
    T: DeserializeOwned,
    U: Serialize,
{
    let partition = state.partition(USERS)?;
    for (key, user) in load::<T>(state)? {
        state.put(&partition, &key, &convert(user)?)?;
    }
    Ok(())
}

pub fn add_field(state: FjallState) -> SvipResult<FjallState> {
    rewrite(&state, |user: UserV1| {
        Ok(UserV2 {
            name: user.name,
            age: user.age,
            email: None,
        })
    })?;
    Ok(state)
}

pub fn remove_field(state: FjallState) -> SvipResult<FjallState> {
    rewrite(&state, |user: UserV2| {
        Ok(UserV1 {
            name: user.name,
            age: user.age,
        })
    })?;
    Ok(state)
}

pub fn rename_field(state: FjallState) -> SvipResult<FjallState> {
    rewrite(&state, |user: UserV2| {
        Ok(UserV3 {
            full_name: user.name,
            age: user.age,
            email: user.email,
        })
    })?;
    Ok(state)
}

pub fn restore_field_name(state: FjallState) -> SvipResult<FjallState> {
    rewrite(&state, |user: UserV3| {
        Ok(UserV2 {
            name: user.full_name,
            age: user.age,
            email: user.email,
        })
    })?;
    Ok(state)
}

/// `renameField` failing halfway: the first user is rewritten, then the step errors.
pub fn rename_field_failing(state: FjallState) -> SvipResult<FjallState> {
    let partition = state.partition(USERS)?;
    if let Some((key, user)) = load::<UserV2>(&state)?.into_iter().next() {
        let renamed = UserV3 {
            full_name: user.name,
            age: user.age,
            email: user.email,
        };
        state.put(&partition, &key, &renamed)?;
    }
    Err(SvipError::new("duplicate full_name", ErrorKind::MigrationFailure))
}

/// The named steps `1 -> 2` (addField) and `2 -> 3` (renameField).
pub fn upgrade_steps() -> Vec<SvipResult<MigrationStep<u32, FjallState>>> {
    vec![
        MigrationStep::new(1, 2, add_field).map(|step| step.with_name("addField")),
        MigrationStep::new(2, 3, rename_field).map(|step| step.with_name("renameField")),
    ]
}

/// The reverse steps `3 -> 2` and `2 -> 1`.
pub fn downgrade_steps() -> Vec<SvipResult<MigrationStep<u32, FjallState>>> {
    vec![
        MigrationStep::new(3, 2, restore_field_name).map(|step| step.with_name("restoreFieldName")),
        MigrationStep::new(2, 1, remove_field).map(|step| step.with_name("removeField")),
    ]
}

pub fn sample_users() -> Vec<UserV1> {
    vec![
        UserV1 {
            name: "Alice".to_string(),
            age: 30,
        },
        UserV1 {
            name: "Bob".to_string(),
            age: 25,
        },
    ]
}
