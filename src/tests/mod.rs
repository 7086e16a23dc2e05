//! Scenario tests for the composed service (directory + coordinator +
//! cache + engine working together).
