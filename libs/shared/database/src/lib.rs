pub mod supabase;

pub use supabase::{DatabaseError, SupabaseClient};
