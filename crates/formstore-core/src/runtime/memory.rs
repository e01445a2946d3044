// crates/formstore-core/src/runtime/memory.rs
// ============================================================================
// Module: Formstore In-Memory Repositories
// Description: Simple in-memory Forms and Instances repositories.
// Purpose: Provide deterministic repositories without a database.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! In-memory implementations of [`FormsRepository`] and
//! [`InstancesRepository`] for tests and database-less callers. Rows are kept
//! in key order and keys are never reused, matching the `SQLite` backend.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::Form;
use crate::core::FormDbId;
use crate::core::Instance;
use crate::core::InstanceDbId;
use crate::core::InstanceStatus;
use crate::interfaces::FormsRepository;
use crate::interfaces::InstancesRepository;
use crate::interfaces::RepositoryError;

// ============================================================================
// SECTION: Table
// ============================================================================

/// Rows keyed by surrogate key plus the next key to assign.
#[derive(Debug)]
struct Table<T> {
    /// Stored rows.
    rows: BTreeMap<i64, T>,
    /// Next surrogate key.
    next_id: i64,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<T: Clone> Table<T> {
    /// Returns clones of every row matching `predicate`, in key order.
    fn select(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.rows.values().filter(|row| predicate(row)).cloned().collect()
    }

    /// Inserts a new row or replaces an existing one.
    fn upsert(&mut self, id: Option<i64>, row: T) -> Result<i64, RepositoryError> {
        let id = match id {
            Some(id) if self.rows.contains_key(&id) => id,
            Some(id) => return Err(RepositoryError::NotFound(format!("row {id}"))),
            None => {
                let id = self.next_id;
                self.next_id += 1;
                id
            }
        };
        self.rows.insert(id, row);
        Ok(id)
    }
}

/// Locks a table, mapping poisoning to a store error.
fn lock<T>(table: &Mutex<Table<T>>) -> Result<MutexGuard<'_, Table<T>>, RepositoryError> {
    table.lock().map_err(|_| RepositoryError::Store("in-memory table mutex poisoned".to_string()))
}

// ============================================================================
// SECTION: Forms
// ============================================================================

/// In-memory Forms repository.
#[derive(Debug, Default)]
pub struct InMemoryFormsRepository {
    /// Form rows protected by a mutex.
    table: Mutex<Table<Form>>,
}

impl InMemoryFormsRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `change` to the row with the given key, if present.
    fn update(&self, id: FormDbId, change: impl FnOnce(&mut Form)) -> Result<(), RepositoryError> {
        if let Some(form) = lock(&self.table)?.rows.get_mut(&id.get()) {
            change(form);
        }
        Ok(())
    }
}

impl FormsRepository for InMemoryFormsRepository {
    fn get(&self, id: FormDbId) -> Result<Option<Form>, RepositoryError> {
        Ok(lock(&self.table)?.rows.get(&id.get()).cloned())
    }

    fn get_one_by_path(&self, form_file_path: &str) -> Result<Option<Form>, RepositoryError> {
        let forms = lock(&self.table)?.select(|form| form.form_file_path == form_file_path);
        Ok(forms.into_iter().next())
    }

    fn get_one_by_md5_hash(&self, md5_hash: &str) -> Result<Option<Form>, RepositoryError> {
        Ok(lock(&self.table)?.select(|form| form.md5_hash == md5_hash).into_iter().next())
    }

    fn get_all(&self) -> Result<Vec<Form>, RepositoryError> {
        Ok(lock(&self.table)?.select(|_| true))
    }

    fn get_all_not_deleted(&self) -> Result<Vec<Form>, RepositoryError> {
        Ok(lock(&self.table)?.select(|form| !form.deleted))
    }

    fn get_all_by_form_id(&self, form_id: &str) -> Result<Vec<Form>, RepositoryError> {
        Ok(lock(&self.table)?.select(|form| form.form_id == form_id))
    }

    fn get_all_not_deleted_by_form_id(
        &self,
        form_id: &str,
    ) -> Result<Vec<Form>, RepositoryError> {
        Ok(lock(&self.table)?.select(|form| !form.deleted && form.form_id == form_id))
    }

    fn get_all_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> Result<Vec<Form>, RepositoryError> {
        Ok(lock(&self.table)?.select(|form| form.matches(form_id, version)))
    }

    fn get_all_not_deleted_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> Result<Vec<Form>, RepositoryError> {
        Ok(lock(&self.table)?.select(|form| !form.deleted && form.matches(form_id, version)))
    }

    fn get_latest_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> Result<Option<Form>, RepositoryError> {
        let forms = lock(&self.table)?.select(|form| form.matches(form_id, version));
        Ok(forms.into_iter().max_by_key(|form| (form.date, form.id)))
    }

    fn save(&self, form: &Form) -> Result<FormDbId, RepositoryError> {
        let mut table = lock(&self.table)?;
        let mut row = form.clone();
        let id = match form.id {
            Some(id) => id.get(),
            None => table.next_id,
        };
        row.id = Some(FormDbId::new(id));
        let id = table.upsert(form.id.map(FormDbId::get), row)?;
        drop(table);
        Ok(FormDbId::new(id))
    }

    fn delete(&self, id: FormDbId) -> Result<(), RepositoryError> {
        lock(&self.table)?.rows.remove(&id.get());
        Ok(())
    }

    fn soft_delete(&self, id: FormDbId) -> Result<(), RepositoryError> {
        self.update(id, |form| form.deleted = true)
    }

    fn restore(&self, id: FormDbId) -> Result<(), RepositoryError> {
        self.update(id, |form| form.deleted = false)
    }

    fn delete_all(&self) -> Result<(), RepositoryError> {
        lock(&self.table)?.rows.clear();
        Ok(())
    }
}

// ============================================================================
// SECTION: Instances
// ============================================================================

/// In-memory Instances repository.
#[derive(Debug, Default)]
pub struct InMemoryInstancesRepository {
    /// Instance rows protected by a mutex.
    table: Mutex<Table<Instance>>,
}

impl InMemoryInstancesRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `change` to the row with the given key, if present.
    fn update(
        &self,
        id: InstanceDbId,
        change: impl FnOnce(&mut Instance),
    ) -> Result<(), RepositoryError> {
        if let Some(instance) = lock(&self.table)?.rows.get_mut(&id.get()) {
            change(instance);
        }
        Ok(())
    }
}

impl InstancesRepository for InMemoryInstancesRepository {
    fn get(&self, id: InstanceDbId) -> Result<Option<Instance>, RepositoryError> {
        Ok(lock(&self.table)?.rows.get(&id.get()).cloned())
    }

    fn get_one_by_path(
        &self,
        instance_file_path: &str,
    ) -> Result<Option<Instance>, RepositoryError> {
        Ok(lock(&self.table)?
            .select(|instance| instance.instance_file_path == instance_file_path)
            .into_iter()
            .next())
    }

    fn get_all(&self) -> Result<Vec<Instance>, RepositoryError> {
        Ok(lock(&self.table)?.select(|_| true))
    }

    fn get_all_not_deleted(&self) -> Result<Vec<Instance>, RepositoryError> {
        Ok(lock(&self.table)?.select(|instance| !instance.is_deleted()))
    }

    fn get_all_by_status(
        &self,
        statuses: &[InstanceStatus],
    ) -> Result<Vec<Instance>, RepositoryError> {
        Ok(lock(&self.table)?.select(|instance| statuses.contains(&instance.status)))
    }

    fn get_count_by_status(&self, statuses: &[InstanceStatus]) -> Result<u64, RepositoryError> {
        let count = self.get_all_by_status(statuses)?.len();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    fn get_all_by_form_id(&self, form_id: &str) -> Result<Vec<Instance>, RepositoryError> {
        Ok(lock(&self.table)?.select(|instance| instance.jr_form_id == form_id))
    }

    fn get_all_not_deleted_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> Result<Vec<Instance>, RepositoryError> {
        Ok(lock(&self.table)?
            .select(|instance| !instance.is_deleted() && instance.references(form_id, version)))
    }

    fn save(&self, instance: &Instance) -> Result<InstanceDbId, RepositoryError> {
        let mut table = lock(&self.table)?;
        let mut row = instance.clone();
        let id = match instance.id {
            Some(id) => id.get(),
            None => table.next_id,
        };
        row.id = Some(InstanceDbId::new(id));
        let id = table.upsert(instance.id.map(InstanceDbId::get), row)?;
        drop(table);
        Ok(InstanceDbId::new(id))
    }

    fn delete(&self, id: InstanceDbId) -> Result<(), RepositoryError> {
        lock(&self.table)?.rows.remove(&id.get());
        Ok(())
    }

    fn soft_delete(
        &self,
        id: InstanceDbId,
        deleted_at_millis: i64,
    ) -> Result<(), RepositoryError> {
        self.update(id, |instance| instance.deleted_date = Some(deleted_at_millis))
    }

    fn restore(&self, id: InstanceDbId) -> Result<(), RepositoryError> {
        self.update(id, |instance| instance.deleted_date = None)
    }

    fn delete_all(&self) -> Result<(), RepositoryError> {
        lock(&self.table)?.rows.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryFormsRepository;
    use crate::core::Form;
    use crate::core::FormDbId;
    use crate::interfaces::FormsRepository;
    use crate::interfaces::RepositoryError;

    fn form(path: &str) -> Form {
        Form {
            form_id: "basic".to_string(),
            form_file_path: path.to_string(),
            ..Form::default()
        }
    }

    #[test]
    fn keys_are_not_reused_after_delete() {
        let repo = InMemoryFormsRepository::new();
        let first = repo.save(&form("/a.xml")).unwrap();
        repo.delete(first).unwrap();
        let second = repo.save(&form("/b.xml")).unwrap();
        assert_ne!(first, second);
        assert_eq!(repo.get(second).unwrap().unwrap().id, Some(second));
    }

    #[test]
    fn updating_missing_row_is_not_found() {
        let repo = InMemoryFormsRepository::new();
        let mut row = form("/a.xml");
        row.id = Some(FormDbId::new(42));
        assert!(matches!(repo.save(&row), Err(RepositoryError::NotFound(_))));
    }
}
