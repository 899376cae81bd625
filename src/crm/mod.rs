//! CRM entities and their persistence.

mod customers;
mod logo;
mod model;
mod repository;

pub use customers::BackendCustomers;
pub use logo::{ALLOWED_LOGO_TYPES, LogoUploader, UploadError, validate_logo};
pub use model::{
    Appointment, AppointmentKind, AppointmentStatus, BrandColors, Contact, ContactStatus, Customer, Customization,
    Deal, DealStage, Entity, NewCustomer, Priority, Task,
};
pub use repository::{InMemoryRepository, Repository, RepositoryError};
