//! Behavioural suites for the MPI daemon.

mod support;
