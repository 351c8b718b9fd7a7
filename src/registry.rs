//! Named readables, writables and user commands.
//!
//! The registry is the single owner of everything a console can observe or
//! change. Bound values are held through [`Shared`] handles, so the
//! application and the registry both own the storage and a binding can never
//! outlive the value it reads. Producers that compute a value on demand are
//! registered as closures that own whatever they capture.
//!
//! ```ignore
//! let throttle = Shared::new(0.0_f64);
//! registry.add_writable("throttle", &throttle, |new, _old| new.clamp(0.0, 1.0));
//! registry.bind_readable("altitude", &altitude);
//! registry.add_command("reset", |_args| { reset_state(); Ok(()) });
//! ```
//!
//! The registry is only touched from the session thread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::codec::{ValueKind, WireValue};
use crate::error::{CodecError, SetError};

/// Shared, thread-safe storage for a bound value.
///
/// Cloning the handle shares the same storage.
#[derive(Debug, Default)]
pub struct Shared<T>(Arc<Mutex<T>>);

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Shared<T> {
    /// Wrap `value` in a new handle.
    pub fn new(value: T) -> Self {
        Self(Arc::new(Mutex::new(value)))
    }

    /// Lock the value for reading or writing.
    ///
    /// A panic while the lock was held does not make the value unreachable.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the value.
    pub fn set(&self, value: T) {
        *self.lock() = value;
    }

    /// Mutate the value in place.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.lock());
    }
}

impl<T: Clone> Shared<T> {
    /// Copy of the current value.
    pub fn get(&self) -> T {
        self.lock().clone()
    }
}

type Producer = Box<dyn Fn() -> String + Send>;
type Setter = Box<dyn FnMut(&str) -> Result<(), CodecError> + Send>;

/// Handler for a user command. Receives the argument list.
pub type CommandFn = Box<dyn FnMut(&[String]) -> anyhow::Result<()> + Send>;

struct ReadableBinding {
    name: String,
    producer: Producer,
}

struct WritableBinding {
    name: String,
    kind: ValueKind,
    producer: Producer,
    setter: Setter,
}

/// Registry of bindings and commands, keyed by name.
#[derive(Default)]
pub struct Registry {
    readables: Vec<ReadableBinding>,
    writables: Vec<WritableBinding>,
    commands: HashMap<String, CommandFn>,
    command_order: Vec<String>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("readables", &self.readables.iter().map(|r| &r.name).collect::<Vec<_>>())
            .field("writables", &self.writables.iter().map(|w| &w.name).collect::<Vec<_>>())
            .field("commands", &self.command_order)
            .finish()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose `value` under `name`, sampled once per tick.
    pub fn bind_readable<T>(&mut self, name: impl Into<String>, value: &Shared<T>)
    where
        T: WireValue + Send + 'static,
    {
        let value = value.clone();
        self.insert_readable(ReadableBinding {
            name: name.into(),
            producer: Box::new(move || value.lock().to_wire()),
        });
    }

    /// Expose the result of `producer` under `name`, called once per tick.
    pub fn bind_readable_fn<T, F>(&mut self, name: impl Into<String>, producer: F)
    where
        T: WireValue,
        F: Fn() -> T + Send + 'static,
    {
        self.insert_readable(ReadableBinding {
            name: name.into(),
            producer: Box::new(move || producer().to_wire()),
        });
    }

    fn insert_readable(&mut self, binding: ReadableBinding) {
        if let Some(existing) = self.readables.iter_mut().find(|r| r.name == binding.name) {
            log::warn!("[Registry] Rebinding readable {}", binding.name);
            *existing = binding;
        } else {
            self.readables.push(binding);
        }
    }

    /// Make `value` settable by `set <name> <value>`.
    ///
    /// `update` receives the decoded value and the current one and returns
    /// the value to store, which is where clamping and validation live.
    pub fn add_writable<T, F>(&mut self, name: impl Into<String>, value: &Shared<T>, mut update: F)
    where
        T: WireValue + Send + 'static,
        F: FnMut(T, &T) -> T + Send + 'static,
    {
        let name = name.into();
        let read_handle = value.clone();
        let write_handle = value.clone();

        let binding = WritableBinding {
            name: name.clone(),
            kind: T::KIND,
            producer: Box::new(move || read_handle.lock().to_wire()),
            setter: Box::new(move |raw| {
                let decoded = T::from_arg(raw)?;
                let mut current = write_handle.lock();
                let accepted = update(decoded, &current);
                *current = accepted;
                Ok(())
            }),
        };

        if let Some(existing) = self.writables.iter_mut().find(|w| w.name == name) {
            log::warn!("[Registry] Rebinding writable {}", name);
            *existing = binding;
        } else {
            self.writables.push(binding);
        }
    }

    /// Make `value` settable, storing whatever decodes successfully.
    pub fn bind_writable<T>(&mut self, name: impl Into<String>, value: &Shared<T>)
    where
        T: WireValue + Send + 'static,
    {
        self.add_writable(name, value, |new, _| new);
    }

    /// Register a user command.
    pub fn add_command<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: FnMut(&[String]) -> anyhow::Result<()> + Send + 'static,
    {
        let name = name.into();
        if self.commands.insert(name.clone(), Box::new(handler)).is_some() {
            log::warn!("[Registry] Replacing command {}", name);
        } else {
            self.command_order.push(name);
        }
    }

    /// Decode `raw` and store it in the writable called `name`.
    pub fn set(&mut self, name: &str, raw: &str) -> Result<(), SetError> {
        let binding = self
            .writables
            .iter_mut()
            .find(|w| w.name == name)
            .ok_or_else(|| SetError::UnknownWritable(name.to_string()))?;

        (binding.setter)(raw).map_err(|error| SetError::InvalidValue {
            name: name.to_string(),
            kind: binding.kind,
            error,
        })
    }

    /// Run the user command `name`, or `None` if there is no such command.
    pub fn call_command(&mut self, name: &str, args: &[String]) -> Option<anyhow::Result<()>> {
        self.commands.get_mut(name).map(|handler| handler(args))
    }

    /// Returns true if a user command named `name` is registered.
    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Current `(name, wire text)` of every readable, then every writable.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let readables = self
            .readables
            .iter()
            .map(|r| (r.name.clone(), (r.producer)()));
        let writables = self
            .writables
            .iter()
            .map(|w| (w.name.clone(), (w.producer)()));
        readables.chain(writables).collect()
    }

    /// Names reported in update frames, in snapshot order.
    pub fn value_names(&self) -> Vec<&str> {
        self.readables
            .iter()
            .map(|r| r.name.as_str())
            .chain(self.writables.iter().map(|w| w.name.as_str()))
            .collect()
    }

    /// Names of user commands, in registration order.
    pub fn command_names(&self) -> Vec<&str> {
        self.command_order.iter().map(String::as_str).collect()
    }
}
