//! Route paths.

pub const GET_HEALTH: &str = "/health";

pub const POST_REGISTER: &str = "/register";
pub const POST_LOGIN: &str = "/login";
pub const POST_REFRESH_TOKEN: &str = "/refresh-token";
pub const POST_LOGOUT: &str = "/logout";
pub const POST_LOGOUT_ALL: &str = "/logout-all";
pub const POST_CHANGE_PASSWORD: &str = "/change-password";

pub const ADMIN_USERS: &str = "/admin/users";
pub const ADMIN_USERS_ID: &str = "/admin/users/{id}";
pub const ADMIN_CUSTOMER: &str = "/admin/customer";
pub const ADMIN_CUSTOMERS: &str = "/admin/customers";
pub const ADMIN_PRICES: &str = "/admin/prices";
pub const ADMIN_BILLS: &str = "/admin/bills";
pub const ADMIN_BILLS_ID: &str = "/admin/bills/{id}";
pub const ADMIN_REPORTS_BILLS: &str = "/admin/reports/bills";
pub const ADMIN_LAST_TRANSACTIONS: &str = "/admin/last-transactions";
pub const ADMIN_WEEKLY_SALES: &str = "/admin/weekly-sales";

pub const CUSTOMER_ME: &str = "/customer/me";
pub const CUSTOMER_MY_BILLS: &str = "/customer/my-bills";
