wire_enum! {
    /// Account role. Admins manage the catalog, users, bookings and inquiries.
    pub enum Role as "role" {
        Customer => "customer",
        Admin => "admin",
    }
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Customer
    }
}
