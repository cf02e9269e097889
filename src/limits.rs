// Hard limits on caller-supplied input. Every request path checks these
// before touching shared state.

/// Max dates in one availability request.
pub const MAX_DATES_PER_REQUEST: usize = 366;

/// Max candidate ids per resource kind in one availability request.
pub const MAX_CANDIDATES_PER_REQUEST: usize = 256;

/// Max raw occupation entries accepted in one resource write.
pub const MAX_OCCUPATIONS_PER_WRITE: usize = 64;

/// Max days one occupation (or one legacy range) may cover.
pub const MAX_DAYS_PER_OCCUPATION: usize = 3660;

/// Max itinerary days on a tour.
pub const MAX_ITINERARY_DAYS: usize = 366;

/// Max guides assigned to a single booking.
pub const MAX_GUIDES_PER_BOOKING: usize = 64;

pub const MAX_NAME_LEN: usize = 256;

pub const MAX_ID_LEN: usize = 128;

pub const MAX_AGENCY_ID_LEN: usize = 64;

pub const MAX_TENANTS: usize = 1024;

pub const MAX_RESOURCES_PER_TENANT: usize = 100_000;

pub const MAX_BOOKINGS_PER_TENANT: usize = 1_000_000;
